// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that define the core
// concepts of the generator.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Binary substructure fingerprint
pub mod fingerprint;

// Error taxonomy shared by every layer
pub mod error;

// Chemistry abstraction consumed by the scoring pipeline
pub mod traits;

// ============================================================
// Layer 4 — Drug-likeness (QED)
// ============================================================
// Quantitative Estimate of Drug-likeness: eight molecular
// descriptors, each mapped through an asymmetric double sigmoid
// (ADS) desirability function, combined as a weighted geometric
// mean.
//
// Descriptors are computed from the molecular graph:
//   MW      molecular weight including implicit hydrogens
//   ALOGP   atom-additive logP (reduced Crippen-style table)
//   HBA     summed matches of the acceptor queries
//   HBD     atoms matching the Lipinski donor query
//   PSA     topological polar surface area (N and O terms)
//   ROTB    rotatable bonds, strict definition (amide C-N,
//           ester C-O and terminal CX3 groups excluded)
//   AROM    aromatic rings
//   ALERTS  number of structural alert queries that match
//
// The SMARTS queries are compiled once per process. A query the
// pattern engine rejects is dropped with a debug log and simply
// never contributes.
//
// Reference: Bickerton et al. (2012) Quantifying the chemical
//            beauty of drugs, Nat. Chem. 4, 90-98

use std::sync::OnceLock;

use crate::chem::molecule::{BondOrder, Molecule};
use crate::chem::pattern::Pattern;

// ─── ADS Parameters ───────────────────────────────────────────────────────────
/// A, B, C, D, E, F, DMAX
struct Ads([f64; 7]);

const MW_ADS:     Ads = Ads([2.817065973, 392.5754953, 290.7489764, 2.419764353, 49.22325677, 65.37051707, 104.9805561]);
const ALOGP_ADS:  Ads = Ads([3.172690585, 137.8624751, 2.534937431, 4.581497897, 0.822739154, 0.576295591, 131.3186604]);
const HBA_ADS:    Ads = Ads([2.948620388, 160.4605972, 3.615294657, 4.435986202, 0.290141953, 1.300669958, 148.7763046]);
const HBD_ADS:    Ads = Ads([1.618662227, 1010.051101, 0.985094388, 0.000000001, 0.713820843, 0.920922555, 258.1632616]);
const PSA_ADS:    Ads = Ads([1.876861559, 125.2232657, 62.90773554, 87.83366614, 12.01999824, 28.51324732, 104.5686167]);
const ROTB_ADS:   Ads = Ads([0.010000000, 272.4121427, 2.558379970, 1.565547684, 1.271567166, 2.758063707, 105.4420403]);
const AROM_ADS:   Ads = Ads([3.217788970, 957.7374108, 2.274627939, 0.000000001, 1.317690384, 0.375760881, 312.3372610]);
const ALERTS_ADS: Ads = Ads([0.010000000, 1199.094025, -0.09002883, 0.000000001, 0.185904477, 0.875193782, 417.7253140]);

/// Mean weights for MW, ALOGP, HBA, HBD, PSA, ROTB, AROM, ALERTS
const WEIGHTS: [f64; 8] = [0.66, 0.46, 0.05, 0.61, 0.06, 0.65, 0.48, 0.95];

// ─── Descriptor Queries ───────────────────────────────────────────────────────
const ACCEPTORS: &[&str] = &[
    "[oH0;X2]",
    "[OH1;X2;v2]",
    "[OH0;X2;v2]",
    "[OH0;X1;v2]",
    "[O-;X1]",
    "[SH0;X2;v2]",
    "[SH0;X1;v2]",
    "[S-;X1]",
    "[nH0;X2]",
    "[NH0;X1;v3]",
    "[$([N;+0;X3;v3]);!$(N[C,S]=O)]",
];

const DONOR: &str = "[N&!H0&v3,N&!H0&+1&v4,O&H1&+0,S&H1&+0,n&H1&+0]";

const STRICT_ROTATABLE: &str = concat!(
    "[!$(*#*)&!D1&!$(C(F)(F)F)&!$(C(Cl)(Cl)Cl)&!$(C(Br)(Br)Br)&!$(C([CH3])([CH3])[CH3])",
    "&!$([CD3](=[N,O,S])-!@[#7,O,S!D1])&!$([#7,O,S!D1]-!@[CD3]=[N,O,S])",
    "&!$([CD3](=[N+])-!@[#7!D1])&!$([#7!D1]-!@[CD3]=[N+])]",
    "-,:;!@",
    "[!$(*#*)&!D1&!$(C(F)(F)F)&!$(C(Cl)(Cl)Cl)&!$(C(Br)(Br)Br)&!$(C([CH3])([CH3])[CH3])]",
);

const STRUCTURAL_ALERTS: &[&str] = &[
    "*1[O,S,N]*1",
    "[S,C](=[O,S])[F,Br,Cl,I]",
    "[CX4][Cl,Br,I]",
    "[#6]S(=O)(=O)O[#6]",
    "[$([CH]),$(CC)]#CC(=O)[#6]",
    "[$([CH]),$(CC)]#CC(=O)O[#6]",
    "n[OH]",
    "[$([CH]),$(CC)]#CS(=O)(=O)[#6]",
    "C=C(C=O)C=O",
    "n1c([F,Cl,Br,I])cccc1",
    "[CH1](=O)",
    "[#8][#8]",
    "[C;!R]=[N;!R]",
    "[N!R]=[N!R]",
    "[#6](=O)[#6](=O)",
    "[#16][#16]",
    "[#7][NH2]",
    "C(=O)N[NH2]",
    "[#6]=S",
    "[$([CH2]),$([CH][CX4]),$(C([CX4])[CX4])]=[$([CH2]),$([CH][CX4]),$(C([CX4])[CX4])]",
    "C1(=[O,N])C=CC(=[O,N])C=C1",
    "C1(=[O,N])C(=[O,N])C=CC=C1",
    "a21aa3a(aa1aaaa2)aaaa3",
    "a31a(a2a(aa1)aaaa2)aaaa3",
    "a1aa2a3a(a1)A=AA=A3=AA=A2",
    "c1cc([NH2])ccc1",
    "[Hg,Fe,As,Sb,Zn,Se,se,Te,B,Si,Na,Ca,Ge,Ag,Mg,K,Ba,Sr,Be,Ti,Mo,Mn,Ru,Pd,Ni,Cu,Au,Cd,Al,Ga,Sn,Rh,Tl,Bi,Nb,Li,Pb,Hf,Ho]",
    "I",
    "OS(=O)(=O)[O-]",
    "[N+](=O)[O-]",
    "C(=O)N[OH]",
    "C1NC(=O)NC(=O)1",
    "[SH]",
    "[S-]",
    "c1ccc([Cl,Br,I,F])c([Cl,Br,I,F])c1[Cl,Br,I,F]",
    "c1cc([Cl,Br,I,F])cc([Cl,Br,I,F])c1[Cl,Br,I,F]",
    "[CR1]1[CR1][CR1][CR1][CR1][CR1][CR1]1",
    "[CR1]1[CR1][CR1]cc[CR1][CR1]1",
    "[CR2]1[CR2][CR2][CR2][CR2][CR2][CR2][CR2]1",
    "[CR2]1[CR2][CR2]cc[CR2][CR2][CR2]1",
    "[CH2R2]1N[CH2R2][CH2R2][CH2R2][CH2R2][CH2R2]1",
    "[CH2R2]1N[CH2R2][CH2R2][CH2R2][CH2R2][CH2R2][CH2R2]1",
    "C#C",
    "[OR2,NR2]@[CR2]@[CR2]@[OR2,NR2]@[CR2]@[CR2]@[OR2,NR2]",
    "[$([N+R]),$([n+R]),$([N+]=C)][O-]",
    "[#6]=N[OH]",
    "[#6]=NOC=O",
    "[#6](=O)[CX4,CR0X3,O][#6](=O)",
    "c1ccc2c(c1)ccc(=O)o2",
    "[O+,o+,S+,s+]",
    "N=C=O",
    "[NX3,NX4][F,Cl,Br,I]",
    "c1ccccc1OC(=O)[#6]",
    "[CR0]=[CR0][CR0]=[CR0]",
    "[C+,c+,C-,c-]",
    "N=[N+]=[N-]",
    "C12C(NC(N1)=O)CSC2",
    "c1c([OH])c([OH,NH2,NH])ccc1",
    "P",
    "[N,O,S]C#N",
    "C=C=O",
    "[Si][F,Cl,Br,I]",
    "[SX2]O",
    "[SiR0,CR0](c1ccccc1)(c2ccccc2)(c3ccccc3)",
    "O1CCCCC1OC2CCC3CCCCC3C2",
    "N=[CR0][N,n,O,S]",
    "[cR2]1[cR2][cR2]([Nv3X3,Nv4X4])[cR2][cR2][cR2]1[cR2]2[cR2][cR2][cR2]([Nv3X3,Nv4X4])[cR2][cR2]2",
    "C=[C!r]C#N",
    "[cR2]1[cR2]c([N+0X3R0,nX3R0])c([N+0X3R0,nX3R0])[cR2][cR2]1",
    "[cR2]1[cR2]c([N+0X3R0,nX3R0])[cR2]c([N+0X3R0,nX3R0])[cR2]1",
    "[cR2]1[cR2]c([N+0X3R0,nX3R0])[cR2][cR2]c1([N+0X3R0,nX3R0])",
    "[OH]c1ccc([OH,NH2,NH])cc1",
    "c1ccccc1OC(=O)O",
    "[SX2H0][N]",
    "c12ccccc1(SC(S)=N2)",
    "c12ccccc1(SC(=S)N2)",
    "c1nnnn1C=O",
    "s1c(S)nnc1NC=O",
    "S1C=CSC1=S",
    "C(=O)Onnn",
    "OS(=O)(=O)C(F)(F)F",
    "N#CC[OH]",
    "N#CC(=O)",
    "S(=O)(=O)C#N",
    "N[CH2]C#N",
    "C1(=O)NCC1",
    "S(=O)(=O)[O-,OH]",
    "NC[F,Cl,Br,I]",
    "C=[C!r]O",
    "[NX2+0]=[O+0]",
    "[OR0,NR0][OR0,NR0]",
    "C(=O)O[C,H1].C(=O)O[C,H1].C(=O)O[C,H1]",
    "[CX2R0][NX3R0]",
    "c1ccccc1[C;!R]=[C;!R]c2ccccc2",
    "[NX3R0,NX4R0,OR0,SX2R0][CX4][NX3R0,NX4R0,OR0,SX2R0]",
    "[s,S,c,C,n,N,o,O]~[n+,N+](~[s,S,c,C,n,N,o,O])(~[s,S,c,C,n,N,o,O])~[s,S,c,C,n,N,o,O]",
    "[s,S,c,C,n,N,o,O]~[nX3+,NX3+](~[s,S,c,C,n,N])~[s,S,c,C,n,N]",
    "[*]=[N+]=[*]",
    "[SX3](=O)[O-,OH]",
    "N#N",
    "F.F.F.F",
    "[R0;D2][R0;D2][R0;D2][R0;D2]",
    "[cR,CR]~C(=O)NC(=O)~[cR,CR]",
    "C=!@CC=[O,S]",
    "[#6,#8,#16][#6](=O)O[#6]",
    "c[C;R0](=[O,S])[#6]",
    "c[SX2][C;!R]",
    "C=C=C",
    "c1nc([F,Cl,Br,I,S])ncc1",
    "c1ncnc([F,Cl,Br,I,S])c1",
    "c1nc(c2c(n1)nc(n2)[F,Cl,Br,I])",
    "[#6]S(=O)(=O)c1ccc(cc1)F",
    "[15N]",
    "[13C]",
    "[18O]",
    "[34S]",
];

struct Queries {
    acceptors: Vec<Pattern>,
    donor:     Vec<Pattern>,
    rotatable: Vec<Pattern>,
    alerts:    Vec<Pattern>,
}

fn compile_all(smarts: &[&str]) -> Vec<Pattern> {
    smarts
        .iter()
        .filter_map(|s| match Pattern::parse(s) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::debug!("QED query '{}' dropped: {}", s, e);
                None
            }
        })
        .collect()
}

fn total_matches(patterns: &[Pattern], mol: &Molecule) -> usize {
    patterns.iter().map(|p| p.count_unique(mol)).sum()
}

fn queries() -> &'static Queries {
    static QUERIES: OnceLock<Queries> = OnceLock::new();
    QUERIES.get_or_init(|| Queries {
        acceptors: compile_all(ACCEPTORS),
        donor:     compile_all(&[DONOR]),
        rotatable: compile_all(&[STRICT_ROTATABLE]),
        alerts:    compile_all(STRUCTURAL_ALERTS),
    })
}

impl Ads {
    fn desirability(&self, x: f64) -> f64 {
        let [a, b, c, d, e, f, dmax] = self.0;
        let rise = 1.0 / (1.0 + (-(x - c + d / 2.0) / e).exp());
        let fall = 1.0 - 1.0 / (1.0 + (-(x - c - d / 2.0) / f).exp());
        (a + b * rise * fall) / dmax
    }
}

// ─── Descriptors ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptors {
    pub mw:     f64,
    pub alogp:  f64,
    pub hba:    usize,
    pub hbd:    usize,
    pub psa:    f64,
    pub rotb:   usize,
    pub arom:   usize,
    pub alerts: usize,
}

impl Descriptors {
    pub fn compute(mol: &Molecule) -> Self {
        let q = queries();
        let count = |patterns: &[Pattern]| total_matches(patterns, mol);
        Self {
            mw:     mol.heavy_mass(),
            alogp:  (0..mol.atom_count()).map(|i| atom_logp(mol, i)).sum(),
            hba:    count(&q.acceptors[..]),
            hbd:    count(&q.donor[..]),
            psa:    (0..mol.atom_count()).map(|i| atom_psa(mol, i)).sum(),
            rotb:   count(&q.rotatable[..]),
            arom:   mol
                .rings()
                .iter()
                .filter(|ring| ring.iter().all(|&a| mol.atom(a).aromatic))
                .count(),
            alerts: q.alerts.iter().filter(|p| p.matches(mol)).count(),
        }
    }

    fn values(&self) -> [f64; 8] {
        [
            self.mw,
            self.alogp,
            self.hba as f64,
            self.hbd as f64,
            self.psa,
            self.rotb as f64,
            self.arom as f64,
            self.alerts as f64,
        ]
    }
}

/// QED in [0, 1].
pub fn qed(mol: &Molecule) -> f64 {
    qed_from(&Descriptors::compute(mol))
}

/// Weighted desirability mean of already computed descriptors.
pub fn qed_from(descriptors: &Descriptors) -> f64 {
    let values = descriptors.values();
    let params = [
        &MW_ADS, &ALOGP_ADS, &HBA_ADS, &HBD_ADS, &PSA_ADS, &ROTB_ADS, &AROM_ADS, &ALERTS_ADS,
    ];
    let mut weighted = 0.0;
    for ((ads, x), w) in params.iter().zip(values).zip(WEIGHTS) {
        weighted += w * ads.desirability(x).max(1e-12).ln();
    }
    let total: f64 = WEIGHTS.iter().sum();
    (weighted / total).exp().clamp(0.0, 1.0)
}

// ─── Atom Contributions ───────────────────────────────────────────────────────
fn heteroatom_neighbour(mol: &Molecule, atom: usize) -> bool {
    mol.neighbors(atom)
        .iter()
        .any(|&(n, _)| !matches!(mol.atom(n).number(), 6 | 1))
}

fn has_order(mol: &Molecule, atom: usize, order: BondOrder) -> bool {
    mol.neighbors(atom).iter().any(|&(_, b)| mol.bond(b).order == order)
}

fn atom_logp(mol: &Molecule, i: usize) -> f64 {
    let atom = mol.atom(i);
    let h    = atom.hydrogens as f64;
    let heavy = match atom.number() {
        6 if atom.aromatic => {
            if atom.hydrogens > 0 { 0.1581 } else if heteroatom_neighbour(mol, i) { 0.1360 } else { 0.2955 }
        }
        6 if heteroatom_neighbour(mol, i) => -0.2035,
        6 if has_order(mol, i, BondOrder::Double) || has_order(mol, i, BondOrder::Triple) => 0.1360,
        6 => 0.1441,
        7 if atom.aromatic => -0.4806,
        7 if atom.charge > 0 => -0.3396,
        7 if has_order(mol, i, BondOrder::Triple) => -0.2458,
        7 => -0.7096,
        8 if atom.aromatic => 0.1552,
        8 if has_order(mol, i, BondOrder::Double) => -0.1526,
        8 if atom.hydrogens > 0 => -0.2893,
        8 => -0.0684,
        9  => 0.4202,
        15 => 0.8612,
        16 if atom.aromatic => 0.6237,
        16 => 0.6482,
        17 => 0.6895,
        35 => 0.8456,
        53 => 0.8857,
        _  => 0.0,
    };
    let per_h = match atom.number() {
        6 if atom.aromatic => 0.1230,
        6 => 0.1230,
        7 => 0.2142,
        8 => -0.2677,
        _ => 0.1230,
    };
    heavy + h * per_h
}

fn atom_psa(mol: &Molecule, i: usize) -> f64 {
    let atom = mol.atom(i);
    match atom.number() {
        7 if atom.aromatic => match (atom.hydrogens, mol.degree(i)) {
            (h, _) if h > 0 => 15.79,
            (_, 3) if mol.neighbors(i).iter().all(|&(_, b)| mol.bond(b).order == BondOrder::Aromatic) => 4.41,
            (_, 3) => 4.93,
            _ => 12.89,
        },
        7 if has_order(mol, i, BondOrder::Triple) => 23.79,
        7 if has_order(mol, i, BondOrder::Double) => 12.36,
        7 => match atom.hydrogens {
            0 => 3.24,
            1 => 12.03,
            _ => 26.02,
        },
        8 if atom.aromatic => 13.14,
        8 if has_order(mol, i, BondOrder::Double) => 17.07,
        8 if atom.hydrogens > 0 => 20.23,
        8 => 9.23,
        _ => 0.0,
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::smiles;

    fn mol(s: &str) -> Molecule {
        smiles::parse(s).unwrap()
    }

    #[test]
    fn test_descriptor_counts() {
        let ethanol = Descriptors::compute(&mol("CCO"));
        assert_eq!(ethanol.hba, 1);
        assert_eq!(ethanol.hbd, 1);
        assert!((ethanol.psa - 20.23).abs() < 1e-9);
        assert!(ethanol.alogp.abs() < 0.05);

        assert_eq!(Descriptors::compute(&mol("CCCC")).rotb, 1);
        assert_eq!(Descriptors::compute(&mol("c1ccccc1")).arom, 1);
        assert_eq!(Descriptors::compute(&mol("C1CCCCC1")).arom, 0);
    }

    #[test]
    fn test_every_query_compiles() {
        let q = queries();
        assert_eq!(q.acceptors.len(), ACCEPTORS.len());
        assert_eq!(q.donor.len(), 1);
        assert_eq!(q.rotatable.len(), 1);
        assert_eq!(q.alerts.len(), STRUCTURAL_ALERTS.len());
    }

    #[test]
    fn test_reference_drug_descriptors() {
        let aspirin = Descriptors::compute(&mol("CC(=O)Oc1ccccc1C(=O)O"));
        assert_eq!(
            (aspirin.hba, aspirin.hbd, aspirin.rotb, aspirin.arom, aspirin.alerts),
            (4, 1, 2, 1, 2)
        );
        assert!((aspirin.psa - 63.6).abs() < 1e-6);

        let paracetamol = Descriptors::compute(&mol("CC(=O)Nc1ccc(O)cc1"));
        assert_eq!(
            (paracetamol.hba, paracetamol.hbd, paracetamol.rotb, paracetamol.arom, paracetamol.alerts),
            (2, 2, 1, 1, 1)
        );

        let caffeine = Descriptors::compute(&mol("Cn1cnc2c1c(=O)n(C)c(=O)n2C"));
        assert_eq!(
            (caffeine.hba, caffeine.hbd, caffeine.rotb, caffeine.arom, caffeine.alerts),
            (3, 0, 0, 2, 0)
        );
        assert!((caffeine.psa - 61.82).abs() < 1e-6);
    }

    #[test]
    fn test_qed_of_published_descriptor_sets() {
        let cases = [
            // mw, alogp, hba, hbd, psa, rotb, arom, alerts, qed
            (180.159, 1.3101, 4, 1, 63.60, 2, 1, 2, 0.5501),
            (151.165, 1.3506, 2, 2, 49.33, 1, 1, 1, 0.5950),
            (194.194, -1.0293, 3, 0, 61.82, 0, 2, 0, 0.5385),
            (78.114, 1.6866, 0, 0, 0.00, 0, 1, 0, 0.4426),
        ];
        for (mw, alogp, hba, hbd, psa, rotb, arom, alerts, expected) in cases {
            let d = Descriptors { mw, alogp, hba, hbd, psa, rotb, arom, alerts };
            let q = qed_from(&d);
            assert!((q - expected).abs() < 1e-3, "mw {mw}: {q} vs {expected}");
        }
    }

    #[test]
    fn test_qed_close_to_published_values() {
        for (smiles_str, expected) in [
            ("CC(=O)Oc1ccccc1C(=O)O", 0.550),
            ("CC(=O)Nc1ccc(O)cc1", 0.595),
            ("c1ccccc1", 0.443),
        ] {
            let q = qed(&mol(smiles_str));
            assert!((q - expected).abs() < 0.04, "{smiles_str}: {q}");
        }
    }

    #[test]
    fn test_alerts_and_strict_rotors() {
        assert_eq!(Descriptors::compute(&mol("CC=O")).alerts, 1);
        assert_eq!(Descriptors::compute(&mol("CCCC")).alerts, 0);
        // amide C-N and bonds to terminal methyls are not rotors
        assert_eq!(Descriptors::compute(&mol("CCNC(C)=O")).rotb, 1);
    }

    #[test]
    fn test_molecular_weight() {
        let water = Descriptors::compute(&mol("O"));
        assert!((water.mw - 18.015).abs() < 0.01);
    }

    #[test]
    fn test_qed_bounds() {
        for s in ["C", "CCO", "c1ccccc1", "CC(=O)Nc1ccc(O)cc1", "CCCCCCCCCCCCCCCCCCCC"] {
            let q = qed(&mol(s));
            assert!((0.0..=1.0).contains(&q), "{s}: {q}");
        }
    }

    #[test]
    fn test_drug_like_scores_higher_than_methane() {
        let paracetamol = qed(&mol("CC(=O)Nc1ccc(O)cc1"));
        let methane     = qed(&mol("C"));
        assert!(paracetamol > methane);
    }
}

// ============================================================
// Layer 4 — SMILES Reader / Writer
// ============================================================
// parse(): SMILES string → finalized Molecule
//   - organic subset atoms (B C N O P S F Cl Br I, aromatic b c n o p s)
//   - bracket atoms [isotope? symbol chirality? Hn? charge? class?]
//   - bonds - = # : / \ (stereo markers read as single)
//   - branches ( ), ring closures 0-9 and %nn, '.' fragments
//
// write(): Molecule → SMILES string (depth-first, ring closures
// assigned in visiting order). Used by the SELFIES decoder.
//
// Reference: OpenSMILES specification

use std::collections::HashMap;

use crate::chem::molecule::{Atom, BondOrder, Element, Molecule};
use crate::domain::error::{GenError, GenResult};

// ─── Reader ───────────────────────────────────────────────────────────────────
pub fn parse(smiles: &str) -> GenResult<Molecule> {
    let smiles = smiles.trim();
    if smiles.is_empty() {
        return Err(GenError::decode("empty SMILES"));
    }

    let chars: Vec<char> = smiles.chars().collect();
    let mut mol        = Molecule::new();
    let mut prev: Option<usize>  = None;
    let mut branches: Vec<Option<usize>> = Vec::new();
    let mut pending: Option<BondOrder>   = None;
    let mut open_rings: HashMap<u32, (usize, Option<BondOrder>)> = HashMap::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '(' => {
                if prev.is_none() {
                    return Err(GenError::decode(format!("branch without atom at {i}")));
                }
                branches.push(prev);
                i += 1;
            }
            ')' => {
                prev = branches
                    .pop()
                    .ok_or_else(|| GenError::decode(format!("unmatched ')' at {i}")))?;
                pending = None;
                i += 1;
            }
            '-' | '/' | '\\' => { pending = Some(BondOrder::Single);   i += 1; }
            '='              => { pending = Some(BondOrder::Double);   i += 1; }
            '#'              => { pending = Some(BondOrder::Triple);   i += 1; }
            ':'              => { pending = Some(BondOrder::Aromatic); i += 1; }
            '.' => {
                prev    = None;
                pending = None;
                i += 1;
            }
            '0'..='9' | '%' => {
                let (number, next) = read_ring_number(&chars, i)?;
                i = next;
                let atom = prev.ok_or_else(|| GenError::decode("ring closure without atom"))?;
                match open_rings.remove(&number) {
                    Some((start, opened_with)) => {
                        let order = pending
                            .or(opened_with)
                            .unwrap_or_else(|| default_bond(&mol, start, atom));
                        mol.add_bond(start, atom, order)?;
                    }
                    None => {
                        open_rings.insert(number, (atom, pending));
                    }
                }
                pending = None;
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or_else(|| GenError::decode("unterminated bracket atom"))?;
                let body: String = chars[i + 1..i + close].iter().collect();
                let atom = parse_bracket_atom(&body)?;
                let idx  = mol.add_atom(atom);
                connect(&mut mol, prev, idx, pending.take())?;
                prev = Some(idx);
                i += close + 1;
            }
            _ => {
                let (atom, len) = parse_organic_atom(&chars, i)?;
                let idx = mol.add_atom(atom);
                connect(&mut mol, prev, idx, pending.take())?;
                prev = Some(idx);
                i += len;
            }
        }
    }

    if !branches.is_empty() {
        return Err(GenError::decode("unclosed branch"));
    }
    if !open_rings.is_empty() {
        return Err(GenError::decode("unclosed ring"));
    }
    if mol.atom_count() == 0 {
        return Err(GenError::decode("no atoms"));
    }
    Ok(mol.finalize())
}

fn connect(mol: &mut Molecule, prev: Option<usize>, idx: usize, order: Option<BondOrder>) -> GenResult<()> {
    if let Some(p) = prev {
        let order = order.unwrap_or_else(|| default_bond(mol, p, idx));
        mol.add_bond(p, idx, order)?;
    }
    Ok(())
}

fn default_bond(mol: &Molecule, a: usize, b: usize) -> BondOrder {
    if mol.atom(a).aromatic && mol.atom(b).aromatic {
        BondOrder::Aromatic
    } else {
        BondOrder::Single
    }
}

fn read_ring_number(chars: &[char], i: usize) -> GenResult<(u32, usize)> {
    if chars[i] == '%' {
        let digits: String = chars.get(i + 1..i + 3)
            .ok_or_else(|| GenError::decode("truncated %nn ring number"))?
            .iter()
            .collect();
        let n = digits
            .parse::<u32>()
            .map_err(|_| GenError::decode(format!("bad ring number %{digits}")))?;
        Ok((n, i + 3))
    } else {
        Ok((chars[i].to_digit(10).unwrap_or(0), i + 1))
    }
}

fn parse_organic_atom(chars: &[char], i: usize) -> GenResult<(Atom, usize)> {
    let c = chars[i];
    let two: Option<String> = chars.get(i + 1).map(|n| [c, *n].iter().collect());
    if let Some(sym) = two.as_deref() {
        if sym == "Cl" || sym == "Br" {
            let element = Element::from_symbol(sym).ok_or_else(|| GenError::decode(sym.to_string()))?;
            return Ok((Atom::new(element), 2));
        }
    }
    let (symbol, aromatic) = match c {
        'B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I' => (c.to_string(), false),
        'b' | 'c' | 'n' | 'o' | 'p' | 's' => (c.to_ascii_uppercase().to_string(), true),
        _ => return Err(GenError::decode(format!("unexpected '{c}' at {i}"))),
    };
    let element = Element::from_symbol(&symbol)
        .ok_or_else(|| GenError::decode(format!("unknown element {symbol}")))?;
    Ok((Atom::new(element).aromatic(aromatic), 1))
}

fn parse_bracket_atom(body: &str) -> GenResult<Atom> {
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;

    // isotope
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }

    // element symbol, lowercase first letter = aromatic
    let first = *chars.get(i).ok_or_else(|| GenError::decode("empty bracket atom"))?;
    let aromatic = first.is_ascii_lowercase();
    let mut symbol = first.to_ascii_uppercase().to_string();
    i += 1;
    if let Some(&next) = chars.get(i) {
        if next.is_ascii_lowercase() {
            let candidate = format!("{symbol}{next}");
            if Element::from_symbol(&candidate).is_some() {
                symbol = candidate;
                i += 1;
            }
        }
    }
    let element = Element::from_symbol(&symbol)
        .ok_or_else(|| GenError::decode(format!("unknown element [{body}]")))?;

    // chirality
    while i < chars.len() && chars[i] == '@' {
        i += 1;
    }

    // hydrogen count
    let mut hydrogens = 0u8;
    if chars.get(i) == Some(&'H') {
        i += 1;
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let digits: String = chars[start..i].iter().collect();
        hydrogens = if digits.is_empty() { 1 } else { digits.parse().unwrap_or(1) };
    }

    // charge
    let mut charge = 0i8;
    if let Some(&sign) = chars.get(i) {
        if sign == '+' || sign == '-' {
            let unit: i8 = if sign == '+' { 1 } else { -1 };
            i += 1;
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            if digits.is_empty() {
                charge = unit;
                while chars.get(i) == Some(&sign) {
                    charge += unit;
                    i += 1;
                }
            } else {
                charge = unit * digits.parse::<i8>().unwrap_or(1);
            }
        }
    }

    // atom class (:n) is ignored
    if i < chars.len() && chars[i] != ':' {
        return Err(GenError::decode(format!("unsupported bracket atom [{body}]")));
    }

    Ok(Atom::new(element).aromatic(aromatic).bracketed(hydrogens, charge))
}

// ─── Writer ───────────────────────────────────────────────────────────────────
pub fn write(mol: &Molecule) -> String {
    let n = mol.atom_count();
    let mut order    = vec![usize::MAX; n];
    let mut children: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
    let mut closures: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots    = Vec::new();
    let mut counter  = 0usize;

    // Pass 1: spanning forest, ring-closure bonds and visiting order
    for root in 0..n {
        if order[root] != usize::MAX {
            continue;
        }
        roots.push(root);
        let mut stack = vec![(root, usize::MAX)];
        while let Some((atom, via)) = stack.pop() {
            if order[atom] != usize::MAX {
                // reached again through another bond: ring closure
                if via != usize::MAX {
                    let other = mol.bond(via).other(atom);
                    if !closures[atom].contains(&via) {
                        closures[atom].push(via);
                        closures[other].push(via);
                    }
                    children[other].retain(|&(_, b)| b != via);
                }
                continue;
            }
            order[atom] = counter;
            counter += 1;
            for &(next, bond) in mol.neighbors(atom).iter().rev() {
                if bond == via {
                    continue;
                }
                if order[next] == usize::MAX {
                    children[atom].push((next, bond));
                    stack.push((next, bond));
                } else if !closures[atom].contains(&bond) {
                    closures[atom].push(bond);
                    closures[next].push(bond);
                    children[next].retain(|&(_, b)| b != bond);
                }
            }
        }
    }
    // children were pushed in reverse neighbour order
    for list in children.iter_mut() {
        list.reverse();
    }

    // Pass 2: emit
    let mut out = String::new();
    let mut digits: HashMap<usize, u32> = HashMap::new();
    let mut free_digits: Vec<u32> = (1..=99).rev().collect();
    for (k, &root) in roots.iter().enumerate() {
        if k > 0 {
            out.push('.');
        }
        emit(mol, root, None, &children, &closures, &order, &mut digits, &mut free_digits, &mut out);
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn emit(
    mol:         &Molecule,
    atom:        usize,
    via:         Option<usize>,
    children:    &[Vec<(usize, usize)>],
    closures:    &[Vec<usize>],
    order:       &[usize],
    digits:      &mut HashMap<usize, u32>,
    free_digits: &mut Vec<u32>,
    out:         &mut String,
) {
    if let Some(bond) = via {
        out.push_str(bond_symbol(mol, bond));
    }
    out.push_str(&atom_symbol(mol.atom(atom)));

    for &bond in &closures[atom] {
        let other = mol.bond(bond).other(atom);
        if let Some(d) = digits.remove(&bond) {
            free_digits.push(d);
            free_digits.sort_unstable_by(|a, b| b.cmp(a));
            push_ring_digit(out, d);
        } else if order[other] > order[atom] {
            let d = free_digits.pop().unwrap_or(99);
            digits.insert(bond, d);
            out.push_str(bond_symbol(mol, bond));
            push_ring_digit(out, d);
        }
    }

    let kids = &children[atom];
    for (k, &(child, bond)) in kids.iter().enumerate() {
        let last = k + 1 == kids.len();
        if !last {
            out.push('(');
        }
        emit(mol, child, Some(bond), children, closures, order, digits, free_digits, out);
        if !last {
            out.push(')');
        }
    }
}

fn push_ring_digit(out: &mut String, d: u32) {
    if d < 10 {
        out.push_str(&d.to_string());
    } else {
        out.push_str(&format!("%{d:02}"));
    }
}

fn bond_symbol(mol: &Molecule, bond: usize) -> &'static str {
    let b = mol.bond(bond);
    match b.order {
        BondOrder::Single if mol.atom(b.a).aromatic && mol.atom(b.b).aromatic => "-",
        BondOrder::Single | BondOrder::Aromatic => "",
        BondOrder::Double => "=",
        BondOrder::Triple => "#",
    }
}

fn atom_symbol(atom: &Atom) -> String {
    let symbol = if atom.aromatic {
        atom.element.symbol.to_ascii_lowercase()
    } else {
        atom.element.symbol.to_string()
    };
    // aromatic [nH] / [pH] hydrogens are not implied by the ring
    let aromatic_nh = atom.aromatic && atom.hydrogens > 0 && matches!(atom.number(), 7 | 15);
    if !atom.bracket && !aromatic_nh && atom.charge == 0 && atom.element.is_organic_subset() {
        return symbol;
    }
    let mut s = format!("[{symbol}");
    match atom.hydrogens {
        0 => {}
        1 => s.push('H'),
        h => s.push_str(&format!("H{h}")),
    }
    match atom.charge {
        0 => {}
        1 => s.push('+'),
        -1 => s.push('-'),
        c if c > 0 => s.push_str(&format!("+{c}")),
        c => s.push_str(&format!("-{}", -c)),
    }
    s.push(']');
    s
}

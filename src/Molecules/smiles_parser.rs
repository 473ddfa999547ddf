//! SMILES reader: organic subset, bracket atoms, branches, ring closures and
//! disconnected fragments. Stereo marks are read and dropped.
use super::molecule_graph::{Atom, BondOrder, Molecule, MoleculeError, atomic_number};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn bracket_regex() -> Result<&'static Regex, MoleculeError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<isotope>\d+)?(?P<symbol>[A-Z][a-z]?|se|as|[bcnops]|\*)(?P<chiral>@{1,2}(?:TH[12]|AL[12]|SP[1-3])?)?(?P<hcount>H\d*)?(?P<charge>\+\+|--|[+-]\d*)?(?::\d+)?$",
        )
    })
    .as_ref()
    .map_err(|e| MoleculeError::Parse {
        position: 0,
        message: format!("bracket atom pattern does not compile: {}", e),
    })
}

/// parses the content of a `[...]` atom, `pos` is only used for error messages
pub(crate) fn parse_bracket_atom(content: &str, pos: usize) -> Result<Atom, MoleculeError> {
    let caps = bracket_regex()?
        .captures(content)
        .ok_or_else(|| MoleculeError::Parse {
            position: pos,
            message: format!("cannot read bracket atom [{}]", content),
        })?;
    let symbol = &caps["symbol"];
    let aromatic = symbol.chars().next().is_some_and(|c| c.is_ascii_lowercase());
    let atomic_num = if symbol == "*" {
        0
    } else {
        atomic_number(symbol).ok_or_else(|| MoleculeError::UnknownElement(symbol.to_string()))?
    };
    let implicit_h = match caps.name("hcount") {
        Some(m) if m.as_str().len() > 1 => m.as_str()[1..].parse::<u32>().map_err(|_| {
            MoleculeError::Parse {
                position: pos,
                message: format!("bad hydrogen count in [{}]", content),
            }
        })?,
        Some(_) => 1,
        None => 0,
    };
    let formal_charge = match caps.name("charge").map(|m| m.as_str()) {
        None => 0,
        Some("++") => 2,
        Some("--") => -2,
        Some(text) => {
            let sign = if text.starts_with('+') { 1 } else { -1 };
            if text.len() == 1 {
                sign
            } else {
                sign * text[1..].parse::<i32>().map_err(|_| MoleculeError::Parse {
                    position: pos,
                    message: format!("bad charge in [{}]", content),
                })?
            }
        }
    };
    let isotope = caps.name("isotope").and_then(|m| m.as_str().parse::<u32>().ok());
    Ok(Atom {
        atomic_num,
        formal_charge,
        aromatic,
        implicit_h,
        isotope,
    })
}

struct SmilesParser {
    chars: Vec<char>,
    pos: usize,
    mol: Molecule,
    prev: Option<usize>,
    branches: Vec<Option<usize>>,
    pending_bond: Option<BondOrder>,
    open_rings: HashMap<u32, (usize, Option<BondOrder>)>,
    organic_atoms: Vec<usize>,
}

impl SmilesParser {
    fn new(smiles: &str) -> Self {
        SmilesParser {
            chars: smiles.chars().collect(),
            pos: 0,
            mol: Molecule::new(smiles),
            prev: None,
            branches: Vec::new(),
            pending_bond: None,
            open_rings: HashMap::new(),
            organic_atoms: Vec::new(),
        }
    }

    fn error(&self, message: &str) -> MoleculeError {
        MoleculeError::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn default_bond(&self, a: usize, b: usize) -> BondOrder {
        if self.mol.atom(a).aromatic && self.mol.atom(b).aromatic {
            BondOrder::Aromatic
        } else {
            BondOrder::Single
        }
    }

    fn attach(&mut self, atom: Atom) -> Result<(), MoleculeError> {
        let idx = self.mol.add_atom(atom);
        if let Some(prev) = self.prev {
            let order = self
                .pending_bond
                .take()
                .unwrap_or_else(|| self.default_bond(prev, idx));
            self.mol.add_bond(prev, idx, order)?;
        } else if self.pending_bond.is_some() {
            return Err(self.error("bond symbol without a preceding atom"));
        }
        self.prev = Some(idx);
        Ok(())
    }

    fn ring_closure(&mut self, label: u32) -> Result<(), MoleculeError> {
        let current = self
            .prev
            .ok_or_else(|| self.error("ring closure without a preceding atom"))?;
        let bond = self.pending_bond.take();
        match self.open_rings.remove(&label) {
            Some((other, opening_bond)) => {
                let order = bond
                    .or(opening_bond)
                    .unwrap_or_else(|| self.default_bond(other, current));
                self.mol.add_bond(other, current, order)?;
            }
            None => {
                self.open_rings.insert(label, (current, bond));
            }
        }
        Ok(())
    }

    fn organic_atom(&mut self) -> Result<Atom, MoleculeError> {
        let c = self.chars[self.pos];
        let next = self.chars.get(self.pos + 1).copied();
        let (symbol, len) = match (c, next) {
            ('C', Some('l')) => ("Cl".to_string(), 2),
            ('B', Some('r')) => ("Br".to_string(), 2),
            ('B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I', _) => (c.to_string(), 1),
            ('b' | 'c' | 'n' | 'o' | 'p' | 's', _) => (c.to_string(), 1),
            ('*', _) => ("*".to_string(), 1),
            _ => return Err(self.error(&format!("unexpected character '{}'", c))),
        };
        self.pos += len;
        let atomic_num = if symbol == "*" {
            0
        } else {
            atomic_number(&symbol).ok_or_else(|| MoleculeError::UnknownElement(symbol.clone()))?
        };
        let mut atom = Atom::new(atomic_num);
        atom.aromatic = symbol.chars().all(|c| c.is_ascii_lowercase());
        Ok(atom)
    }

    fn parse(mut self) -> Result<Molecule, MoleculeError> {
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            match c {
                '(' => {
                    self.branches.push(self.prev);
                    self.pos += 1;
                }
                ')' => {
                    self.prev = self.branches.pop().ok_or(MoleculeError::UnbalancedBranch)?;
                    self.pos += 1;
                }
                '.' => {
                    self.prev = None;
                    self.pos += 1;
                }
                '-' | '/' | '\\' => {
                    self.pending_bond = Some(BondOrder::Single);
                    self.pos += 1;
                }
                '=' => {
                    self.pending_bond = Some(BondOrder::Double);
                    self.pos += 1;
                }
                '#' => {
                    self.pending_bond = Some(BondOrder::Triple);
                    self.pos += 1;
                }
                ':' => {
                    self.pending_bond = Some(BondOrder::Aromatic);
                    self.pos += 1;
                }
                '%' => {
                    let digits: String = self.chars[self.pos + 1..].iter().take(2).collect();
                    let label = digits
                        .parse::<u32>()
                        .map_err(|_| self.error("bad two-digit ring closure"))?;
                    self.pos += 3;
                    self.ring_closure(label)?;
                }
                d if d.is_ascii_digit() => {
                    self.pos += 1;
                    self.ring_closure(d.to_digit(10).unwrap_or(0))?;
                }
                '[' => {
                    let start = self.pos + 1;
                    let end = self.chars[start..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|p| start + p)
                        .ok_or_else(|| self.error("unclosed bracket atom"))?;
                    let content: String = self.chars[start..end].iter().collect();
                    let atom = parse_bracket_atom(&content, start)?;
                    self.pos = end + 1;
                    self.attach(atom)?;
                }
                _ => {
                    let atom = self.organic_atom()?;
                    self.attach(atom)?;
                    if let Some(idx) = self.prev {
                        self.organic_atoms.push(idx);
                    }
                }
            }
        }
        if !self.branches.is_empty() {
            return Err(MoleculeError::UnbalancedBranch);
        }
        if let Some(label) = self.open_rings.keys().min() {
            return Err(MoleculeError::UnclosedRing(*label));
        }
        let organic = std::mem::take(&mut self.organic_atoms);
        self.mol.assign_implicit_h(&organic);
        Ok(self.mol)
    }
}

pub fn parse_smiles(smiles: &str) -> Result<Molecule, MoleculeError> {
    SmilesParser::new(smiles.trim()).parse()
}

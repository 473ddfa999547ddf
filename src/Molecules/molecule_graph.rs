//! # Molecular Graph Module
//!
//! ## Aim
//! Holds the molecular graph the group decomposer works on: atoms with formal charge,
//! aromaticity and implicit hydrogen count, bonds with their order. The graph is a
//! `petgraph` undirected graph, atom indices are insertion order and never change.
//!
//! ## Main Data Structures
//! - `Atom`: element, formal charge, aromatic flag, implicit hydrogens
//! - `BondOrder`: single, double, triple or aromatic bond
//! - `Molecule`: the graph plus a title used in diagnostics
//! - `RingInfo`: which atoms and bonds lie on a cycle (bridges excluded)
//!
//! ## Key Methods
//! - `from_smiles()`: builds a molecule from a SMILES string
//! - `total_h()`, `degree()`, `connectivity()`, `heavy_valence()`: per-atom counts used by patterns
//! - `ring_count()`: cyclomatic number of the graph
//! - `smallest_rings()`: one smallest ring through every ring bond, deduplicated
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;

/// error type for building and parsing molecules
#[derive(Debug, Clone, PartialEq)]
pub enum MoleculeError {
    Parse { position: usize, message: String },
    UnknownElement(String),
    UnclosedRing(u32),
    UnbalancedBranch,
    InvalidBond { from: usize, to: usize },
    AtomOutOfRange(usize),
}

impl fmt::Display for MoleculeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoleculeError::Parse { position, message } => {
                write!(f, "Parse error at position {}: {}", position, message)
            }
            MoleculeError::UnknownElement(symbol) => write!(f, "Unknown element: {}", symbol),
            MoleculeError::UnclosedRing(label) => write!(f, "Ring closure {} is never closed", label),
            MoleculeError::UnbalancedBranch => write!(f, "Unbalanced parentheses"),
            MoleculeError::InvalidBond { from, to } => {
                write!(f, "Invalid bond between atoms {} and {}", from, to)
            }
            MoleculeError::AtomOutOfRange(i) => write!(f, "Atom index {} is out of range", i),
        }
    }
}

impl std::error::Error for MoleculeError {}

/// (symbol, atomic number, default valences) for the organic subset and the ions
/// met in biochemical compounds
const ELEMENTS: &[(&str, u8, &[u32])] = &[
    ("H", 1, &[1]),
    ("He", 2, &[]),
    ("Li", 3, &[]),
    ("Be", 4, &[]),
    ("B", 5, &[3]),
    ("C", 6, &[4]),
    ("N", 7, &[3, 5]),
    ("O", 8, &[2]),
    ("F", 9, &[1]),
    ("Ne", 10, &[]),
    ("Na", 11, &[]),
    ("Mg", 12, &[]),
    ("Al", 13, &[]),
    ("Si", 14, &[4]),
    ("P", 15, &[3, 5]),
    ("S", 16, &[2, 4, 6]),
    ("Cl", 17, &[1]),
    ("Ar", 18, &[]),
    ("K", 19, &[]),
    ("Ca", 20, &[]),
    ("Mn", 25, &[]),
    ("Fe", 26, &[]),
    ("Co", 27, &[]),
    ("Ni", 28, &[]),
    ("Cu", 29, &[]),
    ("Zn", 30, &[]),
    ("As", 33, &[3, 5]),
    ("Se", 34, &[2, 4, 6]),
    ("Br", 35, &[1]),
    ("Mo", 42, &[]),
    ("I", 53, &[1]),
];

/// atomic number of an element symbol, case of the first letter is ignored so that
/// aromatic symbols ("c", "se") resolve too
pub fn atomic_number(symbol: &str) -> Option<u8> {
    let mut chars = symbol.chars();
    let normalized: String = match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => return None,
    };
    ELEMENTS
        .iter()
        .find(|(s, _, _)| *s == normalized)
        .map(|(_, z, _)| *z)
}

pub fn element_symbol(atomic_num: u8) -> &'static str {
    ELEMENTS
        .iter()
        .find(|(_, z, _)| *z == atomic_num)
        .map(|(s, _, _)| *s)
        .unwrap_or("*")
}

pub(crate) fn default_valences(atomic_num: u8) -> &'static [u32] {
    ELEMENTS
        .iter()
        .find(|(_, z, _)| *z == atomic_num)
        .map(|(_, _, v)| *v)
        .unwrap_or(&[])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// contribution of the bond to the valence of its atoms; aromatic bonds count 1
    /// here and the aromatic atom gets one extra unit in `Molecule::assign_implicit_h`
    pub fn valence(&self) -> u32 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub atomic_num: u8,
    pub formal_charge: i32,
    pub aromatic: bool,
    pub implicit_h: u32,
    pub isotope: Option<u32>,
}

impl Atom {
    pub fn new(atomic_num: u8) -> Self {
        Atom {
            atomic_num,
            formal_charge: 0,
            aromatic: false,
            implicit_h: 0,
            isotope: None,
        }
    }

    pub fn with_charge(mut self, charge: i32) -> Self {
        self.formal_charge = charge;
        self
    }

    pub fn with_hydrogens(mut self, n: u32) -> Self {
        self.implicit_h = n;
        self
    }

    pub fn aromatic(mut self) -> Self {
        self.aromatic = true;
        self
    }

    pub fn symbol(&self) -> &'static str {
        element_symbol(self.atomic_num)
    }

    pub fn is_hydrogen(&self) -> bool {
        self.atomic_num == 1
    }
}

/// atoms and bonds that lie on at least one cycle
#[derive(Debug, Clone, Default)]
pub struct RingInfo {
    pub atoms: Vec<bool>,
    pub bonds: HashSet<(usize, usize)>,
}

impl RingInfo {
    pub fn bond_in_ring(&self, a: usize, b: usize) -> bool {
        self.bonds.contains(&(a.min(b), a.max(b)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Molecule {
    pub title: String,
    graph: UnGraph<Atom, BondOrder>,
}

impl Molecule {
    pub fn new(title: &str) -> Self {
        Molecule {
            title: title.to_string(),
            graph: UnGraph::new_undirected(),
        }
    }

    /// parses a SMILES string, the title is set to the SMILES itself
    pub fn from_smiles(smiles: &str) -> Result<Self, MoleculeError> {
        super::smiles_parser::parse_smiles(smiles)
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.graph.add_node(atom).index()
    }

    pub fn add_bond(&mut self, a: usize, b: usize, order: BondOrder) -> Result<(), MoleculeError> {
        let n = self.atom_count();
        if a >= n || b >= n || a == b || self.bond_between(a, b).is_some() {
            return Err(MoleculeError::InvalidBond { from: a, to: b });
        }
        self.graph.add_edge(NodeIndex::new(a), NodeIndex::new(b), order);
        Ok(())
    }

    pub fn atom_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn atom(&self, i: usize) -> &Atom {
        &self.graph[NodeIndex::new(i)]
    }

    pub fn atom_mut(&mut self, i: usize) -> &mut Atom {
        &mut self.graph[NodeIndex::new(i)]
    }

    pub fn atoms(&self) -> impl Iterator<Item = (usize, &Atom)> {
        self.graph
            .node_indices()
            .map(move |idx| (idx.index(), &self.graph[idx]))
    }

    /// all bonds as (lower index, higher index, order)
    pub fn bonds(&self) -> Vec<(usize, usize, BondOrder)> {
        self.graph
            .edge_references()
            .map(|e| {
                let (a, b) = (e.source().index(), e.target().index());
                (a.min(b), a.max(b), *e.weight())
            })
            .collect()
    }

    pub fn neighbors(&self, i: usize) -> Vec<usize> {
        let mut n: Vec<usize> = self
            .graph
            .neighbors(NodeIndex::new(i))
            .map(|idx| idx.index())
            .collect();
        n.sort_unstable();
        n
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<BondOrder> {
        self.graph
            .find_edge(NodeIndex::new(a), NodeIndex::new(b))
            .map(|e| self.graph[e])
    }

    /// number of explicit neighbours (the SMARTS `D`)
    pub fn degree(&self, i: usize) -> usize {
        self.graph.neighbors(NodeIndex::new(i)).count()
    }

    /// implicit hydrogens plus explicit hydrogen neighbours (the SMARTS `H`)
    pub fn total_h(&self, i: usize) -> u32 {
        let explicit = self
            .graph
            .neighbors(NodeIndex::new(i))
            .filter(|n| self.graph[*n].is_hydrogen())
            .count() as u32;
        self.atom(i).implicit_h + explicit
    }

    /// explicit neighbours plus implicit hydrogens (the SMARTS `X`)
    pub fn connectivity(&self, i: usize) -> u32 {
        self.degree(i) as u32 + self.atom(i).implicit_h
    }

    /// number of non-hydrogen neighbours
    pub fn heavy_valence(&self, i: usize) -> usize {
        self.graph
            .neighbors(NodeIndex::new(i))
            .filter(|n| !self.graph[*n].is_hydrogen())
            .count()
    }

    pub fn bond_order_sum(&self, i: usize) -> u32 {
        self.graph
            .edges(NodeIndex::new(i))
            .map(|e| e.weight().valence())
            .sum()
    }

    pub fn net_charge(&self) -> i32 {
        self.atoms().map(|(_, a)| a.formal_charge).sum()
    }

    pub fn hydrogen_count(&self) -> u32 {
        self.atoms()
            .map(|(_, a)| if a.is_hydrogen() { 1 } else { a.implicit_h })
            .sum()
    }

    pub fn hydrogen_atoms(&self) -> Vec<usize> {
        self.atoms()
            .filter(|(_, a)| a.is_hydrogen())
            .map(|(i, _)| i)
            .collect()
    }

    /// fills `implicit_h` of the given atoms from their default valences
    pub(crate) fn assign_implicit_h(&mut self, atoms: &[usize]) {
        for &i in atoms {
            let atom = self.atom(i);
            let mut used = self.bond_order_sum(i);
            if atom.aromatic {
                used += 1;
            }
            let implicit = default_valences(atom.atomic_num)
                .iter()
                .find(|v| **v >= used)
                .map(|v| v - used)
                .unwrap_or(0);
            self.atom_mut(i).implicit_h = implicit;
        }
    }

    /// cyclomatic number: bonds - atoms + connected components
    pub fn ring_count(&self) -> usize {
        if self.atom_count() == 0 {
            return 0;
        }
        let components = connected_components(&self.graph);
        (self.bond_count() + components).saturating_sub(self.atom_count())
    }

    fn shortest_path_avoiding(&self, from: usize, to: usize) -> Option<Vec<usize>> {
        let n = self.atom_count();
        let mut parent: Vec<Option<usize>> = vec![None; n];
        let mut visited = vec![false; n];
        let mut queue = VecDeque::new();
        visited[from] = true;
        queue.push_back(from);
        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current) {
                // the direct bond is the one being tested
                if current == from && next == to {
                    continue;
                }
                if visited[next] {
                    continue;
                }
                visited[next] = true;
                parent[next] = Some(current);
                if next == to {
                    let mut path = vec![to];
                    let mut cursor = to;
                    while let Some(p) = parent[cursor] {
                        path.push(p);
                        cursor = p;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    pub fn ring_info(&self) -> RingInfo {
        let mut info = RingInfo {
            atoms: vec![false; self.atom_count()],
            bonds: HashSet::new(),
        };
        for (a, b, _) in self.bonds() {
            if self.shortest_path_avoiding(a, b).is_some() {
                info.atoms[a] = true;
                info.atoms[b] = true;
                info.bonds.insert((a, b));
            }
        }
        info
    }

    /// For every ring bond the smallest ring through it; duplicates are removed and the
    /// result is truncated to the cyclomatic number, smallest rings first.
    pub fn smallest_rings(&self) -> Vec<Vec<usize>> {
        let mut seen: HashSet<BTreeSet<usize>> = HashSet::new();
        let mut rings: Vec<Vec<usize>> = Vec::new();
        for (a, b, _) in self.bonds() {
            if let Some(path) = self.shortest_path_avoiding(a, b) {
                let key: BTreeSet<usize> = path.iter().copied().collect();
                if seen.insert(key) {
                    rings.push(path);
                }
            }
        }
        rings.sort_by(|x, y| {
            x.len().cmp(&y.len()).then_with(|| {
                let mut xs = x.clone();
                let mut ys = y.clone();
                xs.sort_unstable();
                ys.sort_unstable();
                xs.cmp(&ys)
            })
        });
        rings.truncate(self.ring_count());
        rings
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} atoms, {} bonds)",
            self.title,
            self.atom_count(),
            self.bond_count()
        )
    }
}

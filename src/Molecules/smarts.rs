//! # Substructure Patterns
//!
//! ## Aim
//! Compiles the SMARTS subset used by the group library into a query graph and finds every
//! embedding of that query in a `Molecule`.
//!
//! ## Supported syntax
//! - atoms: organic-subset symbols (aliphatic and aromatic), `*`, bracket expressions
//! - bracket primitives: element symbols, `#n`, `a`, `A`, `Hn`, `Xn`, `Dn`, `R`, `R0`, `+n`, `-n`
//! - logical operators: `!`, `&` (and implicit and), `,`, `;`
//! - bonds: `-`, `=`, `#`, `:`, `~`, `@`; the unspecified bond is single or aromatic
//! - branches, ring closures, `.` for disconnected components
//!
//! ## Matching
//! Backtracking over pattern atoms in depth-first order, each new atom is looked for among the
//! neighbours of the image of an already placed atom. Embeddings are reported as vectors indexed
//! by pattern atom order. Two embeddings covering the same target atoms count once, the first one
//! found is kept.
use super::molecule_graph::{BondOrder, Molecule, MoleculeError, RingInfo, atomic_number};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub enum AtomPrimitive {
    Any,
    Element { atomic_num: u8, aromatic: Option<bool> },
    Aromatic,
    Aliphatic,
    TotalH(u32),
    Connectivity(u32),
    Degree(u32),
    InRing(bool),
    Charge(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtomExpr {
    Primitive(AtomPrimitive),
    Not(Box<AtomExpr>),
    And(Box<AtomExpr>, Box<AtomExpr>),
    Or(Box<AtomExpr>, Box<AtomExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BondQuery {
    /// single or aromatic
    Unspecified,
    Single,
    Double,
    Triple,
    Aromatic,
    Any,
    Ring,
}

struct MatchContext<'a> {
    mol: &'a Molecule,
    rings: &'a RingInfo,
}

impl AtomPrimitive {
    fn matches(&self, ctx: &MatchContext, i: usize) -> bool {
        let atom = ctx.mol.atom(i);
        match self {
            AtomPrimitive::Any => true,
            AtomPrimitive::Element {
                atomic_num,
                aromatic,
            } => atom.atomic_num == *atomic_num && aromatic.is_none_or(|a| a == atom.aromatic),
            AtomPrimitive::Aromatic => atom.aromatic,
            AtomPrimitive::Aliphatic => !atom.aromatic,
            AtomPrimitive::TotalH(n) => ctx.mol.total_h(i) == *n,
            AtomPrimitive::Connectivity(n) => ctx.mol.connectivity(i) == *n,
            AtomPrimitive::Degree(n) => ctx.mol.degree(i) as u32 == *n,
            AtomPrimitive::InRing(flag) => ctx.rings.atoms[i] == *flag,
            AtomPrimitive::Charge(z) => atom.formal_charge == *z,
        }
    }
}

impl AtomExpr {
    fn matches(&self, ctx: &MatchContext, i: usize) -> bool {
        match self {
            AtomExpr::Primitive(p) => p.matches(ctx, i),
            AtomExpr::Not(e) => !e.matches(ctx, i),
            AtomExpr::And(a, b) => a.matches(ctx, i) && b.matches(ctx, i),
            AtomExpr::Or(a, b) => a.matches(ctx, i) || b.matches(ctx, i),
        }
    }
}

impl BondQuery {
    fn matches(&self, ctx: &MatchContext, a: usize, b: usize, order: BondOrder) -> bool {
        match self {
            BondQuery::Unspecified => matches!(order, BondOrder::Single | BondOrder::Aromatic),
            BondQuery::Single => order == BondOrder::Single,
            BondQuery::Double => order == BondOrder::Double,
            BondQuery::Triple => order == BondOrder::Triple,
            BondQuery::Aromatic => order == BondOrder::Aromatic,
            BondQuery::Any => true,
            BondQuery::Ring => ctx.rings.bond_in_ring(a, b),
        }
    }
}

/// compiled SMARTS query
#[derive(Debug, Clone)]
pub struct Pattern {
    pub smarts: String,
    atoms: Vec<AtomExpr>,
    bonds: Vec<(usize, usize, BondQuery)>,
}

impl Pattern {
    pub fn new(smarts: &str) -> Result<Self, MoleculeError> {
        SmartsParser::new(smarts).parse()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    fn neighbours(&self) -> Vec<Vec<(usize, BondQuery)>> {
        let mut adjacency = vec![Vec::new(); self.atoms.len()];
        for &(a, b, q) in &self.bonds {
            adjacency[a].push((b, q));
            adjacency[b].push((a, q));
        }
        adjacency
    }

    /// order in which pattern atoms are placed, with the already placed neighbour each one
    /// is searched from (`None` opens a new component)
    fn search_order(&self, adjacency: &[Vec<(usize, BondQuery)>]) -> Vec<(usize, Option<usize>)> {
        let mut order = Vec::with_capacity(self.atoms.len());
        let mut placed = vec![false; self.atoms.len()];
        for root in 0..self.atoms.len() {
            if placed[root] {
                continue;
            }
            placed[root] = true;
            let mut stack = vec![(root, None)];
            while let Some((atom, parent)) = stack.pop() {
                order.push((atom, parent));
                for &(next, _) in adjacency[atom].iter().rev() {
                    if !placed[next] {
                        placed[next] = true;
                        stack.push((next, Some(atom)));
                    }
                }
            }
        }
        order
    }

    /// Returns every embedding of the pattern in `mol`, each as a vector of target atom
    /// indices ordered like the pattern atoms.
    pub fn find_all(&self, mol: &Molecule) -> Vec<Vec<usize>> {
        self.find_all_with_rings(mol, &mol.ring_info())
    }

    /// Like `find_all`, with the ring perception of `mol` computed by the caller so it
    /// can be shared between patterns.
    pub fn find_all_with_rings(&self, mol: &Molecule, rings: &RingInfo) -> Vec<Vec<usize>> {
        if self.atoms.is_empty() || mol.atom_count() == 0 {
            return Vec::new();
        }
        let ctx = MatchContext { mol, rings };
        let adjacency = self.neighbours();
        let order = self.search_order(&adjacency);
        let mut state = SearchState {
            mapping: vec![None; self.atoms.len()],
            used: vec![false; mol.atom_count()],
            seen: HashSet::new(),
            results: Vec::new(),
        };
        self.extend(&ctx, &adjacency, &order, 0, &mut state);
        state.results
    }

    pub fn matches(&self, mol: &Molecule) -> bool {
        !self.find_all(mol).is_empty()
    }

    fn feasible(
        &self,
        ctx: &MatchContext,
        adjacency: &[Vec<(usize, BondQuery)>],
        state: &SearchState,
        p: usize,
        t: usize,
    ) -> bool {
        if state.used[t] || !self.atoms[p].matches(ctx, t) {
            return false;
        }
        adjacency[p].iter().all(|&(q, query)| match state.mapping[q] {
            Some(u) => match ctx.mol.bond_between(t, u) {
                Some(order) => query.matches(ctx, t, u, order),
                None => false,
            },
            None => true,
        })
    }

    fn extend(
        &self,
        ctx: &MatchContext,
        adjacency: &[Vec<(usize, BondQuery)>],
        order: &[(usize, Option<usize>)],
        depth: usize,
        state: &mut SearchState,
    ) {
        if depth == order.len() {
            let embedding: Vec<usize> = state.mapping.iter().flatten().copied().collect();
            let key: BTreeSet<usize> = embedding.iter().copied().collect();
            if state.seen.insert(key) {
                state.results.push(embedding);
            }
            return;
        }
        let (p, parent) = order[depth];
        let candidates: Vec<usize> = match parent.and_then(|q| state.mapping[q]) {
            Some(image) => ctx.mol.neighbors(image),
            None => (0..ctx.mol.atom_count()).collect(),
        };
        for t in candidates {
            if !self.feasible(ctx, adjacency, state, p, t) {
                continue;
            }
            state.mapping[p] = Some(t);
            state.used[t] = true;
            self.extend(ctx, adjacency, order, depth + 1, state);
            state.mapping[p] = None;
            state.used[t] = false;
        }
    }
}

struct SearchState {
    mapping: Vec<Option<usize>>,
    used: Vec<bool>,
    seen: HashSet<BTreeSet<usize>>,
    results: Vec<Vec<usize>>,
}

struct SmartsParser {
    chars: Vec<char>,
    pos: usize,
    source: String,
    atoms: Vec<AtomExpr>,
    bonds: Vec<(usize, usize, BondQuery)>,
    prev: Option<usize>,
    branches: Vec<Option<usize>>,
    pending_bond: Option<BondQuery>,
    open_rings: HashMap<u32, (usize, Option<BondQuery>)>,
}

impl SmartsParser {
    fn new(smarts: &str) -> Self {
        SmartsParser {
            chars: smarts.trim().chars().collect(),
            pos: 0,
            source: smarts.trim().to_string(),
            atoms: Vec::new(),
            bonds: Vec::new(),
            prev: None,
            branches: Vec::new(),
            pending_bond: None,
            open_rings: HashMap::new(),
        }
    }

    fn error(&self, message: &str) -> MoleculeError {
        MoleculeError::Parse {
            position: self.pos,
            message: format!("{} in SMARTS '{}'", message, self.source),
        }
    }

    fn add_atom(&mut self, expr: AtomExpr) -> Result<(), MoleculeError> {
        let idx = self.atoms.len();
        self.atoms.push(expr);
        if let Some(prev) = self.prev {
            let query = self.pending_bond.take().unwrap_or(BondQuery::Unspecified);
            self.bonds.push((prev, idx, query));
        } else if self.pending_bond.is_some() {
            return Err(self.error("bond without a preceding atom"));
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
            Some((other, opening)) => {
                let query = bond.or(opening).unwrap_or(BondQuery::Unspecified);
                self.bonds.push((other, current, query));
            }
            None => {
                self.open_rings.insert(label, (current, bond));
            }
        }
        Ok(())
    }

    fn bare_atom(&mut self) -> Result<AtomExpr, MoleculeError> {
        let c = self.chars[self.pos];
        let next = self.chars.get(self.pos + 1).copied();
        let (symbol, len): (&str, usize) = match (c, next) {
            ('C', Some('l')) => ("Cl", 2),
            ('B', Some('r')) => ("Br", 2),
            ('*', _) => {
                self.pos += 1;
                return Ok(AtomExpr::Primitive(AtomPrimitive::Any));
            }
            ('a', _) => {
                self.pos += 1;
                return Ok(AtomExpr::Primitive(AtomPrimitive::Aromatic));
            }
            ('A', _) => {
                self.pos += 1;
                return Ok(AtomExpr::Primitive(AtomPrimitive::Aliphatic));
            }
            ('B', _) => ("B", 1),
            ('C', _) => ("C", 1),
            ('N', _) => ("N", 1),
            ('O', _) => ("O", 1),
            ('P', _) => ("P", 1),
            ('S', _) => ("S", 1),
            ('F', _) => ("F", 1),
            ('I', _) => ("I", 1),
            ('b', _) => ("b", 1),
            ('c', _) => ("c", 1),
            ('n', _) => ("n", 1),
            ('o', _) => ("o", 1),
            ('p', _) => ("p", 1),
            ('s', _) => ("s", 1),
            _ => return Err(self.error(&format!("unexpected character '{}'", c))),
        };
        self.pos += len;
        let atomic_num =
            atomic_number(symbol).ok_or_else(|| MoleculeError::UnknownElement(symbol.to_string()))?;
        let aromatic = symbol.chars().all(|c| c.is_ascii_lowercase());
        Ok(AtomExpr::Primitive(AtomPrimitive::Element {
            atomic_num,
            aromatic: Some(aromatic),
        }))
    }

    fn parse(mut self) -> Result<Pattern, MoleculeError> {
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
                '-' | '/' | '\\' | '=' | '#' | ':' | '~' | '@' => {
                    self.pending_bond = Some(match c {
                        '=' => BondQuery::Double,
                        '#' => BondQuery::Triple,
                        ':' => BondQuery::Aromatic,
                        '~' => BondQuery::Any,
                        '@' => BondQuery::Ring,
                        _ => BondQuery::Single,
                    });
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
                        .ok_or_else(|| self.error("unclosed bracket"))?;
                    let content: Vec<char> = self.chars[start..end].to_vec();
                    let expr = BracketParser::new(&content, start, &self.source).parse()?;
                    self.pos = end + 1;
                    self.add_atom(expr)?;
                }
                _ => {
                    let expr = self.bare_atom()?;
                    self.add_atom(expr)?;
                }
            }
        }
        if !self.branches.is_empty() {
            return Err(MoleculeError::UnbalancedBranch);
        }
        if let Some(label) = self.open_rings.keys().min() {
            return Err(MoleculeError::UnclosedRing(*label));
        }
        Ok(Pattern {
            smarts: self.source,
            atoms: self.atoms,
            bonds: self.bonds,
        })
    }
}

/// precedence climbing over `;` < `,` < `&`/juxtaposition < `!`
struct BracketParser<'a> {
    chars: &'a [char],
    pos: usize,
    offset: usize,
    source: &'a str,
}

impl<'a> BracketParser<'a> {
    fn new(chars: &'a [char], offset: usize, source: &'a str) -> Self {
        BracketParser {
            chars,
            pos: 0,
            offset,
            source,
        }
    }

    fn error(&self, message: &str) -> MoleculeError {
        MoleculeError::Parse {
            position: self.offset + self.pos,
            message: format!("{} in SMARTS '{}'", message, self.source),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn parse(mut self) -> Result<AtomExpr, MoleculeError> {
        // a lone hydrogen: [H], [H+], [2H]
        let text: String = self.chars.iter().collect();
        let trimmed = text.trim_start_matches(|c: char| c.is_ascii_digit());
        if trimmed == "H" || trimmed.starts_with("H+") || trimmed.starts_with("H-") {
            self.pos = text.len() - trimmed.len() + 1;
            let mut expr = AtomExpr::Primitive(AtomPrimitive::Element {
                atomic_num: 1,
                aromatic: None,
            });
            if self.pos < self.chars.len() {
                let charge = self.charge()?;
                expr = AtomExpr::And(Box::new(expr), Box::new(charge));
            }
            return Ok(expr);
        }
        let expr = self.low_and()?;
        if self.pos != self.chars.len() {
            return Err(self.error("trailing characters in bracket atom"));
        }
        Ok(expr)
    }

    fn low_and(&mut self) -> Result<AtomExpr, MoleculeError> {
        let mut left = self.or()?;
        while self.peek() == Some(';') {
            self.pos += 1;
            let right = self.or()?;
            left = AtomExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<AtomExpr, MoleculeError> {
        let mut left = self.high_and()?;
        while self.peek() == Some(',') {
            self.pos += 1;
            let right = self.high_and()?;
            left = AtomExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn high_and(&mut self) -> Result<AtomExpr, MoleculeError> {
        let mut left = self.unary()?;
        loop {
            match self.peek() {
                Some('&') => {
                    self.pos += 1;
                    let right = self.unary()?;
                    left = AtomExpr::And(Box::new(left), Box::new(right));
                }
                Some(';') | Some(',') | None => break,
                Some(_) => {
                    let right = self.unary()?;
                    left = AtomExpr::And(Box::new(left), Box::new(right));
                }
            }
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<AtomExpr, MoleculeError> {
        if self.peek() == Some('!') {
            self.pos += 1;
            let inner = self.unary()?;
            return Ok(AtomExpr::Not(Box::new(inner)));
        }
        self.primitive()
    }

    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            let digits: String = self.chars[start..self.pos].iter().collect();
            digits.parse().ok()
        }
    }

    fn charge(&mut self) -> Result<AtomExpr, MoleculeError> {
        let sign = match self.peek() {
            Some('+') => 1,
            Some('-') => -1,
            _ => return Err(self.error("expected a charge")),
        };
        let symbol = self.chars[self.pos];
        self.pos += 1;
        let magnitude = match self.number() {
            Some(n) => n as i32,
            None => {
                let mut n = 1;
                while self.peek() == Some(symbol) {
                    self.pos += 1;
                    n += 1;
                }
                n
            }
        };
        Ok(AtomExpr::Primitive(AtomPrimitive::Charge(sign * magnitude)))
    }

    fn element(&mut self) -> Result<AtomExpr, MoleculeError> {
        let c = self.chars[self.pos];
        let next = self.chars.get(self.pos + 1).copied();
        if c.is_ascii_uppercase() {
            if let Some(n) = next.filter(|n| n.is_ascii_lowercase()) {
                let two: String = [c, n].iter().collect();
                if let Some(z) = atomic_number(&two) {
                    self.pos += 2;
                    return Ok(AtomExpr::Primitive(AtomPrimitive::Element {
                        atomic_num: z,
                        aromatic: Some(false),
                    }));
                }
            }
        } else if c == 's' && next == Some('e') {
            self.pos += 2;
            return Ok(AtomExpr::Primitive(AtomPrimitive::Element {
                atomic_num: 34,
                aromatic: Some(true),
            }));
        }
        let one = c.to_string();
        let z = atomic_number(&one).ok_or_else(|| MoleculeError::UnknownElement(one.clone()))?;
        self.pos += 1;
        Ok(AtomExpr::Primitive(AtomPrimitive::Element {
            atomic_num: z,
            aromatic: Some(c.is_ascii_lowercase()),
        }))
    }

    fn primitive(&mut self) -> Result<AtomExpr, MoleculeError> {
        let c = self
            .peek()
            .ok_or_else(|| self.error("unexpected end of bracket atom"))?;
        let primitive = match c {
            '*' => {
                self.pos += 1;
                AtomPrimitive::Any
            }
            'a' => {
                self.pos += 1;
                AtomPrimitive::Aromatic
            }
            'A' if !self
                .chars
                .get(self.pos + 1)
                .is_some_and(|n| n.is_ascii_lowercase()) =>
            {
                self.pos += 1;
                AtomPrimitive::Aliphatic
            }
            '#' => {
                self.pos += 1;
                let z = self
                    .number()
                    .ok_or_else(|| self.error("expected atomic number after '#'"))?;
                AtomPrimitive::Element {
                    atomic_num: z as u8,
                    aromatic: None,
                }
            }
            'H' => {
                self.pos += 1;
                AtomPrimitive::TotalH(self.number().unwrap_or(1))
            }
            'X' => {
                self.pos += 1;
                AtomPrimitive::Connectivity(self.number().unwrap_or(1))
            }
            'D' => {
                self.pos += 1;
                AtomPrimitive::Degree(self.number().unwrap_or(1))
            }
            'R' => {
                self.pos += 1;
                AtomPrimitive::InRing(self.number().is_none_or(|n| n > 0))
            }
            '+' | '-' => return self.charge(),
            c if c.is_ascii_alphabetic() => return self.element(),
            _ => return Err(self.error(&format!("unsupported primitive '{}'", c))),
        };
        Ok(AtomExpr::Primitive(primitive))
    }
}

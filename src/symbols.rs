/// An entry from the executable's symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub value: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self { symbols }
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Resolve `addr` to `name+0xOFFSET` using the nearest symbol that starts
    /// strictly before it and whose size reaches it (`0 < offset <= size`).
    ///
    /// Ties on offset go to the lexicographically smallest name so the output
    /// is stable across runs. Returns an empty string when nothing matches.
    pub fn symbolicate(&self, addr: u64) -> String {
        self.nearest(addr)
            .map(|(sym, dist)| format!("{}+{:#x}", sym.name, dist))
            .unwrap_or_default()
    }

    fn nearest(&self, addr: u64) -> Option<(&Symbol, u64)> {
        let mut best: Option<(&Symbol, u64)> = None;
        for sym in &self.symbols {
            let Some(dist) = addr.checked_sub(sym.value) else {
                continue;
            };
            if dist == 0 || dist > sym.size {
                continue;
            }
            best = match best {
                Some((cur, cur_dist))
                    if cur_dist < dist || (cur_dist == dist && cur.name <= sym.name) =>
                {
                    Some((cur, cur_dist))
                }
                _ => Some((sym, dist)),
            };
        }
        best
    }
}

impl FromIterator<Symbol> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

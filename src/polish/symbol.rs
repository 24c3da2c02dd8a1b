/// Number of symbols tracked per graph node: A, C, G, T and N.
pub const SYMBOL_COUNT: usize = 5;

/// Nucleotide alphabet used by the graph and the repeat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    /// Adenine.
    A,
    /// Cytosine.
    C,
    /// Guanine.
    G,
    /// Thymine (or uracil).
    T,
    /// Any other byte.
    N,
}

impl Symbol {
    /// All symbols in index order.
    pub const ALL: [Symbol; SYMBOL_COUNT] = [Symbol::A, Symbol::C, Symbol::G, Symbol::T, Symbol::N];

    /// Map a base byte to its symbol; unknown bytes become `N`.
    pub fn from_base(base: u8) -> Self {
        match base {
            b'A' | b'a' => Symbol::A,
            b'C' | b'c' => Symbol::C,
            b'G' | b'g' => Symbol::G,
            b'T' | b't' | b'U' | b'u' => Symbol::T,
            _ => Symbol::N,
        }
    }

    /// Dense index in `0..SYMBOL_COUNT`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Symbol for a dense index.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index]
    }

    /// Uppercase base byte.
    pub fn to_base(self) -> u8 {
        match self {
            Symbol::A => b'A',
            Symbol::C => b'C',
            Symbol::G => b'G',
            Symbol::T => b'T',
            Symbol::N => b'N',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_round_trip_through_bytes() {
        for symbol in Symbol::ALL {
            assert_eq!(Symbol::from_base(symbol.to_base()), symbol);
            assert_eq!(Symbol::from_index(symbol.index()), symbol);
        }
        assert_eq!(Symbol::from_base(b'u'), Symbol::T);
        assert_eq!(Symbol::from_base(b'-'), Symbol::N);
    }
}

//! Constant pool for compiled scripts

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Literal operand referenced by index from the instruction stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// Number literal
    Number(f64),
    /// String value, also used for property and binding names
    String(Box<str>),
    /// BigInt literal digits
    BigInt(Box<str>),
    /// Regular expression
    RegExp {
        /// Source text between the slashes
        pattern: Box<str>,
        /// Flag letters
        flags: Box<str>,
    },
    /// Template object for a tagged template call site
    TemplateObject {
        /// Raw strings
        raw: Vec<Box<str>>,
        /// Cooked strings; `None` for invalid escapes
        cooked: Vec<Option<Box<str>>>,
    },
}

impl Constant {
    /// Number
    #[inline]
    pub fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// String
    #[inline]
    pub fn string(s: impl Into<Box<str>>) -> Self {
        Self::String(s.into())
    }

    /// BigInt from its digits
    #[inline]
    pub fn bigint(s: impl Into<Box<str>>) -> Self {
        Self::BigInt(s.into())
    }

    /// Regular expression literal
    #[inline]
    pub fn regexp(pattern: impl Into<Box<str>>, flags: impl Into<Box<str>>) -> Self {
        Self::RegExp {
            pattern: pattern.into(),
            flags: flags.into(),
        }
    }

    /// Numeric value
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// String value
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Dedup key. Template objects and regexps carry identity, so they are never shared.
    fn key(&self) -> Option<ConstantKey> {
        match self {
            Self::Number(n) => Some(ConstantKey::Number(n.to_bits())),
            Self::String(s) => Some(ConstantKey::String(s.clone())),
            Self::BigInt(s) => Some(ConstantKey::BigInt(s.clone())),
            Self::RegExp { .. } | Self::TemplateObject { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Number(u64),
    String(Box<str>),
    BigInt(Box<str>),
}

/// Per-script literal table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstantPool {
    constants: Vec<Constant>,
    #[serde(skip)]
    index: FxHashMap<ConstantKey, u32>,
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.constants == other.constants
    }
}

impl ConstantPool {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `constant` and return its index. Numbers (bitwise), strings and
    /// BigInts are shared; regexps and template objects always get a new entry.
    pub fn add(&mut self, constant: Constant) -> u32 {
        let key = constant.key();
        if let Some(idx) = key.as_ref().and_then(|k| self.index.get(k)) {
            return *idx;
        }

        let idx = self.constants.len() as u32;
        self.constants.push(constant);
        if let Some(key) = key {
            self.index.insert(key, idx);
        }
        idx
    }

    /// Add a number constant
    #[inline]
    pub fn add_number(&mut self, n: f64) -> u32 {
        self.add(Constant::number(n))
    }

    /// Add a string constant
    #[inline]
    pub fn add_string(&mut self, s: &str) -> u32 {
        self.add(Constant::string(s))
    }

    /// Constant at `index`
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// Get a string constant by index
    #[inline]
    pub fn get_str(&self, index: u32) -> Option<&str> {
        self.get(index).and_then(Constant::as_str)
    }

    /// Entry count
    #[inline]
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Whether nothing was interned yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Entries in index order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.constants.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_pool_dedup() {
        let mut pool = ConstantPool::new();

        let idx1 = pool.add_string("hello");
        let idx2 = pool.add_string("world");
        let idx3 = pool.add_string("hello"); // duplicate

        assert_eq!(idx1, 0);
        assert_eq!(idx2, 1);
        assert_eq!(idx3, 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_negative_zero_is_distinct() {
        let mut pool = ConstantPool::new();
        let zero = pool.add_number(0.0);
        let neg_zero = pool.add_number(-0.0);
        assert_ne!(zero, neg_zero);
        assert_eq!(pool.add_number(0.0), zero);
    }

    #[test]
    fn test_regexp_not_shared() {
        let mut pool = ConstantPool::new();
        let a = pool.add(Constant::regexp("a+", "g"));
        let b = pool.add(Constant::regexp("a+", "g"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_constant_get() {
        let mut pool = ConstantPool::new();
        pool.add_string("test");
        pool.add_number(123.0);

        assert_eq!(pool.get_str(0), Some("test"));
        assert_eq!(pool.get(1), Some(&Constant::Number(123.0)));
        assert_eq!(pool.get(2), None);
    }
}

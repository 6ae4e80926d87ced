//! Native values and name/value lists.

use std::fmt;

/// A self-describing native value.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// Unsigned 64-bit integer.
    Uint64(u64),
    /// Boolean. Presence-only flags decode as `Boolean(true)`.
    Boolean(bool),
    /// UTF-8 string without interior NUL bytes.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Nested name/value list.
    List(NvList),
}

impl NativeValue {
    /// Human-readable type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            NativeValue::Uint64(_) => "uint64",
            NativeValue::Boolean(_) => "boolean",
            NativeValue::String(_) => "string",
            NativeValue::Bytes(_) => "bytes",
            NativeValue::List(_) => "list",
        }
    }

    /// The integer, if this is a `Uint64`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            NativeValue::Uint64(v) => Some(*v),
            _ => None,
        }
    }

    /// The flag, if this is a `Boolean`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// The string, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// The bytes, if this is a `Bytes` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            NativeValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// The nested list, if this is a `List`.
    pub fn as_list(&self) -> Option<&NvList> {
        match self {
            NativeValue::List(v) => Some(v),
            _ => None,
        }
    }
}

impl From<u64> for NativeValue {
    fn from(v: u64) -> Self {
        NativeValue::Uint64(v)
    }
}

impl From<bool> for NativeValue {
    fn from(v: bool) -> Self {
        NativeValue::Boolean(v)
    }
}

impl From<&str> for NativeValue {
    fn from(v: &str) -> Self {
        NativeValue::String(v.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(v: String) -> Self {
        NativeValue::String(v)
    }
}

impl From<Vec<u8>> for NativeValue {
    fn from(v: Vec<u8>) -> Self {
        NativeValue::Bytes(v)
    }
}

impl From<NvList> for NativeValue {
    fn from(v: NvList) -> Self {
        NativeValue::List(v)
    }
}

/// How a list orders its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMode {
    /// Entries are kept sorted by name. Used for property maps.
    #[default]
    Sorted,
    /// Entries are kept in insertion order. Used for command parameters,
    /// which the kernel reads positionally.
    Ordered,
}

/// A list of uniquely named native values.
///
/// Equality is map equality: two lists are equal when they hold the same names
/// with equal values, whatever their order. Use [`NvList::same_order`] when the
/// order matters.
#[derive(Debug, Clone, Default)]
pub struct NvList {
    mode: ListMode,
    pairs: Vec<(String, NativeValue)>,
}

impl NvList {
    /// Creates an empty list that keeps its entries sorted by name.
    pub fn new() -> Self {
        Self {
            mode: ListMode::Sorted,
            pairs: Vec::new(),
        }
    }

    /// Creates an empty list that keeps entries in insertion order.
    pub fn ordered() -> Self {
        Self {
            mode: ListMode::Ordered,
            pairs: Vec::new(),
        }
    }

    /// How this list orders its entries.
    pub fn mode(&self) -> ListMode {
        self.mode
    }

    /// Inserts a value, returning the previous value stored under `name`.
    ///
    /// An existing entry is replaced in place and keeps its position.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<NativeValue>,
    ) -> Option<NativeValue> {
        let name = name.into();
        let value = value.into();
        match self.mode {
            ListMode::Sorted => {
                match self
                    .pairs
                    .binary_search_by(|(k, _)| k.as_str().cmp(name.as_str()))
                {
                    Ok(idx) => Some(std::mem::replace(&mut self.pairs[idx].1, value)),
                    Err(idx) => {
                        self.pairs.insert(idx, (name, value));
                        None
                    }
                }
            }
            ListMode::Ordered => match self.position(&name) {
                Some(idx) => Some(std::mem::replace(&mut self.pairs[idx].1, value)),
                None => {
                    self.pairs.push((name, value));
                    None
                }
            },
        }
    }

    /// Builder form of [`NvList::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<NativeValue>) -> Self {
        self.insert(name, value);
        self
    }

    fn position(&self, name: &str) -> Option<usize> {
        match self.mode {
            ListMode::Sorted => self
                .pairs
                .binary_search_by(|(k, _)| k.as_str().cmp(name))
                .ok(),
            ListMode::Ordered => self.pairs.iter().position(|(k, _)| k == name),
        }
    }

    /// Value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&NativeValue> {
        self.position(name).map(|idx| &self.pairs[idx].1)
    }

    /// Whether an entry named `name` exists.
    pub fn contains_key(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Removes and returns the entry named `name`.
    pub fn remove(&mut self, name: &str) -> Option<NativeValue> {
        self.position(name).map(|idx| self.pairs.remove(idx).1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates entries in list order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NativeValue)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates entry names in list order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    /// Appends every entry of `other`, in `other`'s order.
    pub fn extend_from(&mut self, other: &NvList) {
        for (k, v) in other.iter() {
            self.insert(k, v.clone());
        }
    }

    /// Returns true when both lists hold the same names in the same order and
    /// every nested list also matches in order.
    pub fn same_order(&self, other: &NvList) -> bool {
        self.pairs.len() == other.pairs.len()
            && self
                .pairs
                .iter()
                .zip(other.pairs.iter())
                .all(|((ka, va), (kb, vb))| {
                    ka == kb
                        && match (va, vb) {
                            (NativeValue::List(a), NativeValue::List(b)) => a.same_order(b),
                            _ => va == vb,
                        }
                })
    }

    /// Returns true when every name and string in the tree can be encoded:
    /// no interior NUL bytes and names shorter than `i16::MAX` bytes.
    pub fn is_well_formed(&self) -> bool {
        self.iter().all(|(k, v)| {
            k.len() < i16::MAX as usize
                && !k.contains('\0')
                && match v {
                    NativeValue::String(s) => !s.contains('\0'),
                    NativeValue::List(l) => l.is_well_formed(),
                    _ => true,
                }
        })
    }
}

impl PartialEq for NvList {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).map(|o| o == v).unwrap_or(false))
    }
}

impl<K: Into<String>, V: Into<NativeValue>> FromIterator<(K, V)> for NvList {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut list = NvList::new();
        for (k, v) in iter {
            list.insert(k, v);
        }
        list
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Uint64(v) => write!(f, "{}", v),
            NativeValue::Boolean(v) => write!(f, "{}", v),
            NativeValue::String(v) => write!(f, "{:?}", v),
            NativeValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            NativeValue::List(l) => {
                write!(f, "{{")?;
                for (i, (k, v)) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

//! Symbol naming helpers shared by the filters and the call stack

/// Fictitious symbol representing the top of the call tree.
///
/// The parentheses keep it from colliding with real function names.
pub const ROOT_SYMBOL: &str = "main()";

/// Delimiter between caller and callee in stack keys
pub const STACK_DELIMITER: &str = "==>";

/// Compute the 8-bit structural hash of a symbol name.
///
/// A DJB-style multiply/xor over the bytes, folded down to one byte by
/// summing the bytes of the 64-bit state. Used only as a cheap pre-check:
/// equal names always hash equal, collisions merely cost an exact compare.
#[inline]
pub fn symbol_hash(symbol: &str) -> u8 {
    let mut h: u64 = 5381;
    for &b in symbol.as_bytes() {
        h = h.wrapping_add(h << 5);
        h ^= u64::from(b);
    }
    h.to_ne_bytes()
        .iter()
        .fold(0u8, |acc, &byte| acc.wrapping_add(byte))
}

/// Append `name` (and `@level` for recursive frames) to `out`
pub fn push_entry_name(out: &mut String, name: &str, recursion_level: u32) {
    out.push_str(name);
    if recursion_level > 0 {
        out.push('@');
        out.push_str(&recursion_level.to_string());
    }
}

/// Format a frame name with its recursion suffix
pub fn entry_name(name: &str, recursion_level: u32) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    push_entry_name(&mut out, name, recursion_level);
    out
}

//! Base-level operations on primer and read sequences.

use bstr::BString;

/// The IUPAC nucleotide codes (upper case) accepted in primer sequences.
pub const IUPAC_BASES: &[u8] = b"ACGTUNRYSWKMBDHV";

/// Lookup table mapping every byte to its complement.
///
/// IUPAC ambiguity codes map to the code for the complementary set (e.g. `R` (A/G) to `Y` (C/T)),
/// `S`, `W` and `N` are their own complement, `U` complements to `A`.  Case is preserved and
/// any other byte maps to itself.
const COMPLEMENT: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = i as u8;
        i += 1;
    }
    let pairs: &[(u8, u8)] = &[
        (b'A', b'T'),
        (b'T', b'A'),
        (b'U', b'A'),
        (b'C', b'G'),
        (b'G', b'C'),
        (b'R', b'Y'),
        (b'Y', b'R'),
        (b'K', b'M'),
        (b'M', b'K'),
        (b'B', b'V'),
        (b'V', b'B'),
        (b'D', b'H'),
        (b'H', b'D'),
        (b'S', b'S'),
        (b'W', b'W'),
        (b'N', b'N'),
    ];
    let mut j = 0;
    while j < pairs.len() {
        let (base, comp) = pairs[j];
        table[base as usize] = comp;
        table[base.to_ascii_lowercase() as usize] = comp.to_ascii_lowercase();
        j += 1;
    }
    table
};

/// Returns the complement of a single base, preserving case.
#[inline]
pub fn complement(base: u8) -> u8 {
    COMPLEMENT[base as usize]
}

/// Reverse complements the given bases, preserving case.
///
/// ```rust
/// use primerdemux_lib::sequence::reverse_complement;
/// assert_eq!(reverse_complement(b"ACGTacgt"), "acgtACGT");
/// ```
pub fn reverse_complement(bases: &[u8]) -> BString {
    bases.iter().rev().map(|b| complement(*b)).collect::<Vec<u8>>().into()
}

/// True if every byte is an IUPAC nucleotide code (either case).
pub fn is_iupac(bases: &[u8]) -> bool {
    bases.iter().all(|b| IUPAC_BASES.contains(&b.to_ascii_uppercase()))
}

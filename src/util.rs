//! Miscellaneous helpers shared by the wire codec and the `resolve` demo binary.

/// Dumps out a byte slice in a `hexdump -C`-like format.
pub fn hexdump(slice: &[u8]) {
    const WIDTH: usize = 16;
    let mut offset = 0;

    for row in slice.chunks(WIDTH) {
        let row_hex: String = row.iter().map(|x| format!("{0:02X} ", x)).collect();

        // For each byte on this row, only print out the ascii printable ones.
        let row_str: String = row
            .iter()
            .map(|x| {
                if (0x20..=0x7e).contains(x) {
                    *x as char
                } else {
                    '.'
                }
            })
            .collect();

        println!("{0:>08x}: {1:<48} {2:}", offset, row_hex, row_str);

        offset += WIDTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hexdump_does_not_panic_on_short_input() {
        hexdump(&[0xde, 0xad, 0xbe, 0xef]);
    }
}

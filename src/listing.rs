//! Listing-file loader: parses the assembler's `.lst` output into
//! address/word pairs plus a label table, skipping the two-line header.

use std::collections::BTreeMap;

use crate::error::SimError;

/// One parsed listing: the (address, word) pairs to preload into memory,
/// in file order, plus a label-name to address map.
#[derive(Debug, Default, Clone)]
pub struct Listing {
    pub words: Vec<(u16, u16)>,
    pub labels: BTreeMap<String, u16>,
}

/// Parses listing text already stripped of its two header lines (the
/// assembler banner and the column-name row). Each remaining line holds a
/// 4-digit address, a 4-digit data word, and an optional label starting at
/// column 11, all fixed-column the way the assembler emits them.
pub fn parse(body: &str) -> Result<Listing, SimError> {
    let mut listing = Listing::default();

    for (i, raw_line) in body.lines().enumerate() {
        let line = raw_line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let line_no = i + 3; // two header lines already skipped by the caller

        if line.len() < 9 {
            return Err(SimError::BadListingLine { line_no, line: line.to_string() });
        }

        let addr_str = &line[0..4];
        let data_str = line.get(5..9).unwrap_or("");

        let addr = u16::from_str_radix(addr_str.trim(), 16)
            .map_err(|_| SimError::BadListingLine { line_no, line: line.to_string() })?;
        let data = u16::from_str_radix(data_str.trim(), 16)
            .map_err(|_| SimError::BadListingLine { line_no, line: line.to_string() })?;

        listing.words.push((addr, data));

        if let Some(tail) = line.get(11..) {
            if let Some(label) = tail.split_whitespace().next() {
                listing.labels.insert(label.to_string(), addr);
            }
        }
    }

    Ok(listing)
}

/// Strips the assembler's two-line header (banner + column names) from raw
/// listing text, as every entry point into loading a listing must do
/// before splitting into per-line records.
pub fn strip_header(text: &str) -> &str {
    let mut rest = text;
    for _ in 0..2 {
        if let Some(pos) = rest.find('\n') {
            rest = &rest[pos + 1..];
        } else {
            rest = "";
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_address_data_and_label_columns() {
        let body = "0000 0123 START\n0002 0456\n";
        let listing = parse(body).unwrap();
        assert_eq!(listing.words, vec![(0x0000, 0x0123), (0x0002, 0x0456)]);
        assert_eq!(listing.labels.get("START"), Some(&0x0000));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let body = "0000 0001\n\n0002 0002\n";
        let listing = parse(body).unwrap();
        assert_eq!(listing.words.len(), 2);
    }

    #[test]
    fn strip_header_removes_exactly_two_lines() {
        let text = "banner\ncolumns\n0000 0001\n";
        assert_eq!(strip_header(text), "0000 0001\n");
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let body = "xxxx bad\n";
        let err = parse(body).unwrap_err();
        match err {
            SimError::BadListingLine { line_no, .. } => assert_eq!(line_no, 3),
            other => panic!("wrong error variant: {other:?}"),
        }
    }
}

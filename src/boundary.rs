use crate::constants;

/// The active delimiter of a decoding session: `CRLF "--" token` plus the
/// failure table used to search for it.
///
/// The token can be swapped for one of the same length when a nested
/// `multipart/mixed` section starts, and the leading CRLF can be dropped
/// while the preamble is skipped.
#[derive(Debug, Clone)]
pub(crate) struct Boundary {
    delimiter: Vec<u8>,
    table: Vec<isize>,
    stripped: bool,
}

impl Boundary {
    pub(crate) fn new(token: &[u8]) -> Boundary {
        let mut delimiter = Vec::with_capacity(constants::BOUNDARY_PREFIX.len() + token.len());
        delimiter.extend_from_slice(constants::BOUNDARY_PREFIX);
        delimiter.extend_from_slice(token);

        let mut boundary = Boundary {
            table: vec![0; delimiter.len() + 1],
            delimiter,
            stripped: false,
        };
        boundary.compute_table();
        boundary
    }

    /// The token without the `CRLF "--"` prefix.
    pub(crate) fn token(&self) -> &[u8] {
        &self.delimiter[constants::BOUNDARY_PREFIX.len()..]
    }

    /// The bytes currently searched for.
    pub(crate) fn active(&self) -> &[u8] {
        if self.stripped {
            &self.delimiter[constants::CRLF.len()..]
        } else {
            &self.delimiter
        }
    }

    /// Length of the full delimiter, independent of the preamble adjustment.
    pub(crate) fn full_len(&self) -> usize {
        self.delimiter.len()
    }

    /// Replaces the token. Tokens of a different length are refused and the
    /// length the token must have is returned.
    pub(crate) fn set_token(&mut self, token: &[u8]) -> Result<(), usize> {
        let expected = self.token().len();
        if token.len() != expected {
            return Err(expected);
        }

        self.delimiter.truncate(constants::BOUNDARY_PREFIX.len());
        self.delimiter.extend_from_slice(token);
        self.compute_table();
        Ok(())
    }

    /// Searches for the delimiter without its leading CRLF, as the very
    /// first delimiter of a body may not be preceded by one.
    pub(crate) fn strip_leading_crlf(&mut self) {
        if !self.stripped {
            self.stripped = true;
            self.compute_table();
        }
    }

    pub(crate) fn restore_leading_crlf(&mut self) {
        if self.stripped {
            self.stripped = false;
            self.compute_table();
        }
    }

    fn compute_table(&mut self) {
        let offset = if self.stripped { constants::CRLF.len() } else { 0 };
        let pattern = &self.delimiter[offset..];
        let table = &mut self.table;

        table.clear();
        table.resize(pattern.len() + 1, 0);
        table[0] = -1;

        let mut position = 2;
        let mut candidate = 0usize;

        while position <= pattern.len() {
            if pattern[position - 1] == pattern[candidate] {
                table[position] = candidate as isize + 1;
                candidate += 1;
                position += 1;
            } else if candidate > 0 {
                candidate = table[candidate] as usize;
            } else {
                table[position] = 0;
                position += 1;
            }
        }
    }

    /// Returns the offset of the first complete match of the active
    /// delimiter in `haystack`.
    pub(crate) fn find_in(&self, haystack: &[u8]) -> Option<usize> {
        let pattern = self.active();
        let mut pos = 0;
        let mut matched: isize = 0;

        while pos < haystack.len() {
            if matched == 0 {
                match memchr::memchr(pattern[0], &haystack[pos..]) {
                    Some(skip) => pos += skip,
                    None => return None,
                }
            }

            while matched >= 0 && haystack[pos] != pattern[matched as usize] {
                matched = self.table[matched as usize];
            }

            pos += 1;
            matched += 1;

            if matched as usize == pattern.len() {
                return Some(pos - pattern.len());
            }
        }

        None
    }
}

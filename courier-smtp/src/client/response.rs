//! SMTP reply parsing.

use super::error::{ClientError, Result};

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The three digit reply code.
    pub code: u16,
    /// Text of every line, without the code and separator.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx: the server wants more input (DATA, AUTH challenges).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_temporary_error() || self.is_permanent_error()
    }

    /// Returns the reply if its code is exactly `expected`.
    ///
    /// # Errors
    ///
    /// `ClientError::SmtpError` for a 4xx/5xx reply, otherwise
    /// `ClientError::UnexpectedResponse`.
    pub fn expect_code(self, expected: u16) -> Result<Self> {
        if self.code == expected {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    /// Returns the reply if it is any 2xx.
    ///
    /// # Errors
    ///
    /// As [`Response::expect_code`].
    pub fn expect_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    /// Converts a reply the caller did not want into an error.
    #[must_use]
    pub fn into_error(self) -> ClientError {
        let message = self.message();
        if self.is_error() {
            ClientError::SmtpError {
                code: self.code,
                message,
            }
        } else {
            ClientError::UnexpectedResponse {
                code: self.code,
                message,
            }
        }
    }

    /// Whether an EHLO reply advertises `keyword` (case-insensitive).
    ///
    /// The first line of an EHLO reply is the server's greeting, so only the
    /// following lines are considered.
    #[must_use]
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.extension_lines()
            .any(|(name, _)| name.eq_ignore_ascii_case(keyword))
    }

    /// SASL mechanisms listed by the `AUTH` extension, upper-cased.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.extension_lines()
            .filter(|(name, _)| name.eq_ignore_ascii_case("AUTH"))
            .flat_map(|(_, params)| params.split_whitespace())
            .map(str::to_ascii_uppercase)
            .collect()
    }

    fn extension_lines(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().skip(1).map(|line| {
            // Some relays still send the pre-standard `AUTH=LOGIN PLAIN` form
            line.split_once([' ', '='])
                .unwrap_or((line.as_str(), ""))
        })
    }

    /// Parses one reply from the front of `buffer`.
    ///
    /// Returns `None` if the buffer does not hold a complete reply yet,
    /// otherwise the reply and the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if a line is malformed or the lines
    /// of a multi-line reply disagree on the code.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let line = std::str::from_utf8(raw)?.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }

            let (line_code, is_last, text) = parse_line(line)?;
            match code {
                Some(expected) if expected != line_code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: \
                         expected {expected}, got {line_code}"
                    )));
                }
                _ => code = Some(line_code),
            }
            lines.push(text.to_string());

            if is_last {
                return Ok(Some((Self::new(line_code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

/// Splits `250-text` / `250 text` / `250` into code, last-line flag and text.
fn parse_line(line: &str) -> Result<(u16, bool, &str)> {
    let code = line
        .get(..3)
        .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u16>().ok())
        .ok_or_else(|| ClientError::ParseError(format!("Invalid status code in '{line}'")))?;

    let rest = &line[3..];
    match rest.chars().next() {
        None => Ok((code, true, "")),
        Some(' ') => Ok((code, true, &rest[1..])),
        Some('-') => Ok((code, false, &rest[1..])),
        Some(c) => Err(ClientError::ParseError(format!(
            "Invalid separator character: '{c}'"
        ))),
    }
}

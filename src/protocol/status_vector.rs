//! Status vectors: the tagged error words every response carries.

use crate::wire::xdr::{self, XdrCtx};
use crate::{gds, FbResult};

/// One tagged word of a status vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusWord {
    /// An engine status code.
    Gds(i32),
    /// A status code carried as a warning.
    Warning(i32),
    /// A numeric argument to the preceding code.
    Number(i32),
    /// A string argument to the preceding code.
    Str(String),
}

/// An ordered list of tagged words describing the outcome of an operation.
///
/// An empty vector (or one containing only warnings) is a success. The wire
/// form is a sequence of `{tag, payload}` pairs closed by an end tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusVector {
    words: Vec<StatusWord>,
}

impl StatusVector {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn from_gds(code: i32) -> Self {
        Self {
            words: vec![StatusWord::Gds(code)],
        }
    }

    pub fn push_gds(&mut self, code: i32) -> &mut Self {
        self.words.push(StatusWord::Gds(code));
        self
    }

    pub fn push_warning(&mut self, code: i32) -> &mut Self {
        self.words.push(StatusWord::Warning(code));
        self
    }

    pub fn push_number(&mut self, n: i32) -> &mut Self {
        self.words.push(StatusWord::Number(n));
        self
    }

    pub fn push_str<S: Into<String>>(&mut self, s: S) -> &mut Self {
        self.words.push(StatusWord::Str(s.into()));
        self
    }

    pub fn words(&self) -> &[StatusWord] {
        &self.words
    }

    /// True when the vector carries no error (warnings do not count).
    pub fn is_success(&self) -> bool {
        !self.words.iter().any(|w| matches!(w, StatusWord::Gds(_)))
    }

    pub fn has_warnings(&self) -> bool {
        self.words
            .iter()
            .any(|w| matches!(w, StatusWord::Warning(_)))
    }

    /// The first error code, if any.
    pub fn primary_gds(&self) -> Option<i32> {
        self.words.iter().find_map(|w| match w {
            StatusWord::Gds(code) => Some(*code),
            _ => None,
        })
    }

    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        for word in &self.words {
            match word {
                StatusWord::Gds(code) => {
                    xdr::put_i32(w, gds::ARG_GDS)?;
                    xdr::put_i32(w, *code)?;
                }
                StatusWord::Warning(code) => {
                    xdr::put_i32(w, gds::ARG_WARNING)?;
                    xdr::put_i32(w, *code)?;
                }
                StatusWord::Number(n) => {
                    xdr::put_i32(w, gds::ARG_NUMBER)?;
                    xdr::put_i32(w, *n)?;
                }
                StatusWord::Str(s) => {
                    xdr::put_i32(w, gds::ARG_STRING)?;
                    xdr::put_cstring(w, ctx, s.as_bytes())?;
                }
            }
        }
        xdr::put_i32(w, gds::ARG_END)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        let mut words = Vec::new();
        loop {
            let tag = xdr::get_i32(r)?;
            match tag {
                gds::ARG_END => break,
                gds::ARG_GDS => words.push(StatusWord::Gds(xdr::get_i32(r)?)),
                gds::ARG_WARNING => words.push(StatusWord::Warning(xdr::get_i32(r)?)),
                gds::ARG_NUMBER => words.push(StatusWord::Number(xdr::get_i32(r)?)),
                gds::ARG_STRING | gds::ARG_CSTRING | gds::ARG_INTERPRETED | gds::ARG_SQL_STATE => {
                    let bytes = xdr::get_cstring(r, ctx)?;
                    words.push(StatusWord::Str(String::from_utf8_lossy(&bytes).into_owned()));
                }
                unknown => {
                    return Err(crate::FbError::Protocol(format!(
                        "unknown status vector tag {unknown}"
                    )));
                }
            }
        }
        Ok(Self { words })
    }
}

impl std::fmt::Display for StatusVector {
    /// The user-visible text block: one line per code, prefixed with the
    /// code itself, string arguments on continuation lines.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut first = true;
        for word in &self.words {
            match word {
                StatusWord::Gds(code) | StatusWord::Warning(code) => {
                    if !first {
                        writeln!(f)?;
                    }
                    first = false;
                    write!(f, "{code}: {}", gds::text_for(*code))?;
                }
                StatusWord::Number(n) => {
                    write!(f, " ({n})")?;
                }
                StatusWord::Str(s) => {
                    if first {
                        first = false;
                        write!(f, "-{s}")?;
                    } else {
                        write!(f, "\n-{s}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for StatusVector {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip() {
        let mut sv = StatusVector::from_gds(gds::NET_READ_ERR);
        sv.push_str("peer went away").push_number(42);
        sv.push_warning(gds::RANDOM);

        let ctx = XdrCtx::with_protocol(13);
        let mut buf = Vec::new();
        sv.emit(&mut buf, ctx).unwrap();
        let mut rdr = std::io::Cursor::new(buf);
        let parsed = StatusVector::parse(&mut rdr, ctx).unwrap();
        assert_eq!(parsed, sv);
        assert!(!parsed.is_success());
        assert!(parsed.has_warnings());
        assert_eq!(parsed.primary_gds(), Some(gds::NET_READ_ERR));
    }

    #[test]
    fn warnings_alone_are_success() {
        let mut sv = StatusVector::success();
        sv.push_warning(gds::RANDOM);
        assert!(sv.is_success());
        assert!(sv.primary_gds().is_none());
    }

    #[test]
    fn formats_as_code_prefixed_block() {
        let mut sv = StatusVector::from_gds(gds::LOGIN);
        sv.push_str("for user SYSDBA");
        let text = sv.to_string();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("335544472: "));
        assert_eq!(lines.next().unwrap(), "-for user SYSDBA");
    }
}

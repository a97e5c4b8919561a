//! Nested transactions through savepoints.
//!
//! A connection keeps an ordered stack of savepoint names. The bottom entry
//! names the real transaction (`BEGIN`/`COMMIT`/`ROLLBACK`); every entry above
//! it is a server savepoint.

use uuid::Uuid;

use crate::driver::Session;
use crate::error::{Error, Result};

/// Stack of active savepoint names, innermost last.
#[derive(Debug, Default, Clone)]
pub struct Savepoints {
    stack: Vec<String>,
}

impl Savepoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh savepoint name: `SP` followed by a compact UUID.
    pub fn generate_name() -> String {
        format!("SP{}", Uuid::new_v4().simple())
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Innermost savepoint.
    pub fn top(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stack.iter().any(|s| s == name)
    }

    /// Names from outermost to innermost.
    pub fn names(&self) -> &[String] {
        &self.stack
    }

    /// Open a transaction or a nested savepoint. Returns the savepoint name.
    pub(crate) fn begin(&mut self, session: &mut dyn Session, name: Option<&str>) -> Result<String> {
        let name = match name {
            Some(name) => {
                check_name(name)?;
                if self.contains(name) {
                    return Err(Error::InvalidUsage(format!(
                        "savepoint {} is already active",
                        name
                    )));
                }
                name.to_string()
            }
            None => Self::generate_name(),
        };

        if self.stack.is_empty() {
            session.begin()?;
        } else {
            session.savepoint(&name)?;
        }
        self.stack.push(name.clone());
        Ok(name)
    }

    /// Commit the innermost savepoint, or the whole transaction when `name` is `None`.
    pub(crate) fn commit(&mut self, session: &mut dyn Session, name: Option<&str>) -> Result<()> {
        let Some(name) = name else {
            return self.end(session.commit());
        };

        if self.top() != Some(name) {
            return Err(Error::InvalidUsage(format!(
                "can only commit the innermost savepoint, not {}",
                name
            )));
        }
        if self.stack.len() == 1 {
            return self.end(session.commit());
        }
        session.release_savepoint(name)?;
        self.stack.pop();
        Ok(())
    }

    /// Roll back to `name`, discarding every savepoint above it, or the whole
    /// transaction when `name` is `None`.
    pub(crate) fn rollback(&mut self, session: &mut dyn Session, name: Option<&str>) -> Result<()> {
        let Some(name) = name else {
            return self.end(session.rollback());
        };

        let Some(depth) = self.stack.iter().position(|s| s == name) else {
            return Err(Error::InvalidUsage(format!("no such savepoint: {}", name)));
        };
        if depth == 0 {
            return self.end(session.rollback());
        }
        session.rollback_to_savepoint(name)?;
        session.release_savepoint(name)?;
        self.stack.truncate(depth);
        Ok(())
    }

    /// The server leaves the transaction block after `COMMIT` or `ROLLBACK`
    /// whether or not it succeeded, so the stack is emptied either way.
    fn end(&mut self, result: Result<()>) -> Result<()> {
        self.stack.clear();
        result
    }
}

/// Savepoint names are spliced into SQL, so only identifiers are accepted.
fn check_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidUsage(format!(
            "invalid savepoint name: {:?}",
            name
        )))
    }
}

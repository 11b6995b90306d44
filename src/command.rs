// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::encoding::Encoding;

/// One unit of the command stream sent to a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Command<T> {
    Comment(String),
    Assert(T),
    /// An uninterpreted constant (no `args`) or function.
    DeclareSymbol {
        name: String,
        args: Vec<Encoding>,
        ret: Encoding,
    },
    DefineSymbol {
        name: String,
        args: Vec<(String, Encoding)>,
        ret: Encoding,
        body: T,
    },
    /// Makes the struct sort of the given arity available.
    DeclareStructArity(usize),
    Push,
    Pop,
}

impl<T> Command<T> {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Comment(_) => "comment",
            Command::Assert(_) => "assert",
            Command::DeclareSymbol { .. } => "declare",
            Command::DefineSymbol { .. } => "define",
            Command::DeclareStructArity(_) => "declare-struct",
            Command::Push => "push",
            Command::Pop => "pop",
        }
    }
}

/// Tally of the commands a connection has written to its sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandCounts {
    pub comments: usize,
    pub asserts: usize,
    pub declares: usize,
    pub defines: usize,
    pub struct_arities: usize,
    pub pushes: usize,
    pub pops: usize,
}

impl CommandCounts {
    pub fn record<T>(&mut self, cmd: &Command<T>) {
        let slot = match cmd {
            Command::Comment(_) => &mut self.comments,
            Command::Assert(_) => &mut self.asserts,
            Command::DeclareSymbol { .. } => &mut self.declares,
            Command::DefineSymbol { .. } => &mut self.defines,
            Command::DeclareStructArity(_) => &mut self.struct_arities,
            Command::Push => &mut self.pushes,
            Command::Pop => &mut self.pops,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.comments
            + self.asserts
            + self.declares
            + self.defines
            + self.struct_arities
            + self.pushes
            + self.pops
    }
}

impl fmt::Display for CommandCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} declares, {} defines, {} asserts, {} comments, {} struct sorts, {} push, {} pop",
            self.declares,
            self.defines,
            self.asserts,
            self.comments,
            self.struct_arities,
            self.pushes,
            self.pops
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_kind() {
        let mut counts = CommandCounts::default();
        counts.record(&Command::Assert("p".to_string()));
        counts.record::<String>(&Command::Push);
        counts.record::<String>(&Command::DeclareSymbol {
            name: "p".to_string(),
            args: vec![],
            ret: Encoding::Bool,
        });
        assert_eq!(counts.asserts, 1);
        assert_eq!(counts.pushes, 1);
        assert_eq!(counts.declares, 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(Command::<String>::Pop.kind(), "pop");
    }
}

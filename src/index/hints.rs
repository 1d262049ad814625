//! Type-hint analysis.
//!
//! Extracts the component names a parameter's type hint refers to, with the
//! containment kind each implies:
//!
//! | Hint | Kind |
//! |------|------|
//! | `Button` | direct |
//! | `Optional[Button]`, `Button \| None`, `Union[Button, None]` | optional |
//! | `List[Button]`, `Sequence[Button]`, `Dict[str, Button]` | repeated |
//!
//! Malformed hints yield no references.

use crate::models::EdgeKind;

const COLLECTIONS: &[&str] = &[
    "List", "list", "Sequence", "Iterable", "Collection", "Set", "set", "FrozenSet", "frozenset",
    "Tuple", "tuple",
];

const MAPPINGS: &[&str] = &["Dict", "dict", "Mapping", "MutableMapping"];

const OPAQUE: &[&str] = &["Literal", "Callable", "Type", "type", "Annotated"];

const BUILTINS: &[&str] = &[
    "str", "int", "float", "bool", "bytes", "complex", "object", "Any", "None", "NoneType",
    "list", "dict", "set", "tuple", "frozenset", "List", "Dict", "Set", "Tuple", "Optional",
    "Union", "Sequence", "Iterable", "Mapping",
];

#[derive(Debug, Clone, PartialEq)]
enum TypeExpr {
    Name { name: String, args: Vec<TypeExpr> },
    Union(Vec<TypeExpr>),
}

impl TypeExpr {
    fn is_none(&self) -> bool {
        matches!(self, Self::Name { name, args } if args.is_empty() && (name == "None" || name == "NoneType"))
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> Option<String> {
        self.skip_ws();
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '\'' | '"'))
        {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let name = raw.trim_matches(|c| c == '\'' || c == '"').to_string();
        (!name.is_empty()).then_some(name)
    }

    /// `union := atom ('|' atom)*`
    fn union(&mut self) -> Option<TypeExpr> {
        let first = self.atom()?;
        let mut members = vec![first];
        while self.eat('|') {
            members.push(self.atom()?);
        }
        Some(if members.len() == 1 {
            members.remove(0)
        } else {
            TypeExpr::Union(members)
        })
    }

    /// `atom := NAME ('[' union (',' union)* ']')?`
    fn atom(&mut self) -> Option<TypeExpr> {
        let name = self.name()?;
        let mut args = Vec::new();
        if self.eat('[') && !self.eat(']') {
            loop {
                args.push(self.union()?);
                if self.eat(',') {
                    continue;
                }
                if self.eat(']') {
                    break;
                }
                return None;
            }
        }
        Some(TypeExpr::Name { name, args })
    }
}

fn widen(kind: EdgeKind, to: EdgeKind) -> EdgeKind {
    kind.max(to)
}

fn collect(expr: &TypeExpr, kind: EdgeKind, out: &mut Vec<(String, EdgeKind)>) {
    match expr {
        TypeExpr::Union(members) => {
            let optional = members.iter().any(TypeExpr::is_none);
            let kind = if optional {
                widen(kind, EdgeKind::Optional)
            } else {
                kind
            };
            for member in members.iter().filter(|m| !m.is_none()) {
                collect(member, kind, out);
            }
        },
        TypeExpr::Name { name, args } => {
            let base = name.rsplit('.').next().unwrap_or(name);
            if OPAQUE.contains(&base) {
                return;
            }
            if base == "Optional" {
                for arg in args {
                    collect(arg, widen(kind, EdgeKind::Optional), out);
                }
            } else if base == "Union" {
                collect(&TypeExpr::Union(args.clone()), kind, out);
            } else if COLLECTIONS.contains(&base) {
                for arg in args {
                    collect(arg, EdgeKind::Repeated, out);
                }
            } else if MAPPINGS.contains(&base) {
                if let Some(value) = args.get(1) {
                    collect(value, EdgeKind::Repeated, out);
                }
            } else if !BUILTINS.contains(&base) {
                out.push((name.clone(), kind));
            }
        },
    }
}

/// Component names referenced by a type hint, with their implied edge kind.
///
/// A name referenced twice keeps its widest kind.
#[must_use]
pub fn referenced_types(hint: &str) -> Vec<(String, EdgeKind)> {
    let mut parser = Parser::new(hint);
    let Some(expr) = parser.union() else {
        return Vec::new();
    };
    if parser.peek().is_some() {
        return Vec::new();
    }

    let mut refs = Vec::new();
    collect(&expr, EdgeKind::Direct, &mut refs);

    let mut merged: Vec<(String, EdgeKind)> = Vec::new();
    for (name, kind) in refs {
        match merged.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = existing.1.max(kind),
            None => merged.push((name, kind)),
        }
    }
    merged
}

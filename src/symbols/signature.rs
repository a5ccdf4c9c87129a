//! Parsing of canonical IL names back into structural references.
//!
//! Declarative rule tables name the references they match in the same canonical form
//! that [`crate::model::SymbolRef::full_name`] prints:
//!
//! ```text
//! type    := name [ '<' type { ',' type } '>' ]
//! field   := type ' ' type '::' member
//! method  := type ' ' type '::' member [ '<' type { ',' type } '>' ] '(' [ type { ',' type } ] ')'
//! ```
//!
//! The canonical form does not say whether a method is static or to which assembly a
//! type belongs, so parsed references have `has_this == false` and an empty scope. They
//! are used as lookup keys; rewrite targets are completed from the member catalog.

use crate::{
    model::{FieldRef, MethodRef, SymbolRef, TypeRef},
    Error, Result,
};

/// Parses a single type name, e.g. ``Netcode.NetRef`1<StardewValley.Farmer>``.
///
/// # Errors
///
/// Returns [`Error::Signature`] if the text is not a well-formed type name.
///
/// # Examples
///
/// ```rust
/// use cilshim::symbols::parse_type;
///
/// let ty = parse_type("Netcode.NetFieldBase`2<System.Int32, Netcode.NetInt>").unwrap();
/// assert_eq!(ty.name, "Netcode.NetFieldBase`2");
/// assert_eq!(ty.generic_arguments.len(), 2);
/// assert_eq!(ty.full_name(), "Netcode.NetFieldBase`2<System.Int32,Netcode.NetInt>");
/// ```
pub fn parse_type(text: &str) -> Result<TypeRef> {
    let mut parser = Parser::new(text);
    let ty = parser.parse_type()?;
    parser.expect_end()?;
    Ok(ty)
}

/// Parses a canonical field or method signature.
///
/// # Errors
///
/// Returns [`Error::Signature`] if the text is neither a field nor a method signature.
///
/// # Examples
///
/// ```rust
/// use cilshim::{model::SymbolRef, symbols::parse_signature};
///
/// let sig = parse_signature("System.Void StardewValley.Game1::drawDialogue(StardewValley.NPC,System.String)").unwrap();
/// match sig {
///     SymbolRef::Method(method) => {
///         assert_eq!(method.name, "drawDialogue");
///         assert_eq!(method.parameters.len(), 2);
///     }
///     _ => unreachable!(),
/// }
/// ```
pub fn parse_signature(text: &str) -> Result<SymbolRef> {
    let mut parser = Parser::new(text);
    let member_type = parser.parse_type()?;
    parser.expect(' ')?;
    parser.skip_whitespace();
    let declaring_type = parser.parse_type()?;
    parser.expect(':')?;
    parser.expect(':')?;
    let name = parser.parse_member_name()?;

    if parser.at_end() {
        return Ok(SymbolRef::Field(FieldRef::new(
            declaring_type,
            name,
            member_type,
        )));
    }

    let generic_arguments = if parser.peek() == Some('<') {
        parser.bump();
        let args = parser.parse_type_list('>')?;
        if args.is_empty() {
            return Err(parser.error("empty generic argument list"));
        }
        args
    } else {
        Vec::new()
    };

    parser.expect('(')?;
    let parameters = parser.parse_type_list(')')?;
    parser.expect_end()?;

    Ok(SymbolRef::Method(
        MethodRef::new_static(declaring_type, name, member_type, parameters)
            .with_generic_arguments(generic_arguments),
    ))
}

/// Parses a comma-separated list of type names, as used for parameter lists.
///
/// Commas nested inside generic argument lists do not split the list.
///
/// # Errors
///
/// Returns [`Error::Signature`] if any element is not a well-formed type name.
pub fn parse_type_list(text: &str) -> Result<Vec<TypeRef>> {
    let wrapped = format!("{text})");
    let mut parser = Parser::new(&wrapped);
    let types = parser.parse_type_list(')')?;
    parser.expect_end()?;
    Ok(types)
}

/// Parses a type or member signature and prints it back in canonical form.
///
/// Used to normalise whitespace in hand-written rule tables so that lookups are exact.
///
/// # Errors
///
/// Returns [`Error::Signature`] for malformed input.
pub fn canonicalize(text: &str) -> Result<String> {
    if text.contains("::") {
        Ok(parse_signature(text)?.full_name())
    } else {
        Ok(parse_type(text)?.full_name())
    }
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Parser {
            text: text.trim(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, what: &str) -> Error {
        Error::Signature(format!("{what} at {} in '{}'", self.pos, self.text))
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.peek() == Some(expected) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        self.skip_whitespace();
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("unexpected trailing text"))
        }
    }

    fn take_while(&mut self, stop: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(|c| !stop(c)) {
            self.bump();
        }
        &self.text[start..self.pos]
    }

    fn parse_type(&mut self) -> Result<TypeRef> {
        let name = self.take_while(|c| matches!(c, '<' | '>' | ',' | '(' | ')' | ':') || c.is_whitespace());
        if name.is_empty() {
            return Err(self.error("expected type name"));
        }

        let mut ty = TypeRef::new("", name);
        if self.peek() == Some('<') {
            self.bump();
            ty.generic_arguments = self.parse_type_list('>')?;
            if ty.generic_arguments.is_empty() {
                return Err(self.error("empty generic argument list"));
            }
        }
        Ok(ty)
    }

    fn parse_member_name(&mut self) -> Result<String> {
        let name = self.take_while(|c| matches!(c, '<' | '(' ) || c.is_whitespace());
        if name.is_empty() {
            return Err(self.error("expected member name"));
        }
        Ok(name.to_string())
    }

    /// Parses `type { ',' type }` up to and including `close`.
    fn parse_type_list(&mut self, close: char) -> Result<Vec<TypeRef>> {
        let mut types = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(close) {
            self.bump();
            return Ok(types);
        }

        loop {
            self.skip_whitespace();
            types.push(self.parse_type()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.bump(),
                Some(c) if c == close => {
                    self.bump();
                    return Ok(types);
                }
                _ => return Err(self.error(&format!("expected ',' or '{close}'"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_signature() {
        let sig = parse_signature(
            "Netcode.NetCollection`1<StardewValley.Objects.Furniture> StardewValley.Locations.DecoratableLocation::furniture",
        )
        .unwrap();

        let SymbolRef::Field(field) = sig else {
            panic!("expected field");
        };
        assert_eq!(field.name, "furniture");
        assert_eq!(field.declaring_type.name, "StardewValley.Locations.DecoratableLocation");
        assert_eq!(field.field_type.generic_arguments[0].name, "StardewValley.Objects.Furniture");
    }

    #[test]
    fn test_parse_generic_instance_method() {
        let text = "!0 Netcode.NetFieldBase`2<Microsoft.Xna.Framework.Color,Netcode.NetColor>::op_Implicit(Netcode.NetFieldBase`2<!0,!1>)";
        let sig = parse_signature(text).unwrap();
        assert_eq!(sig.full_name(), text);

        let SymbolRef::Method(method) = sig else {
            panic!("expected method");
        };
        assert!(method.return_type.is_generic_parameter());
        assert_eq!(method.declaring_type.generic_arity(), 2);
        assert_eq!(method.parameters[0].generic_arguments.len(), 2);
    }

    #[test]
    fn test_parse_generic_method_arguments() {
        let sig = parse_signature(
            "!!0 StardewValley.LocalizedContentManager::Load<System.String>(System.String)",
        )
        .unwrap();
        let SymbolRef::Method(method) = sig else {
            panic!("expected method");
        };
        assert_eq!(method.generic_arguments.len(), 1);
        assert_eq!(method.name, "Load");
    }

    #[test]
    fn test_parse_nested_and_constructor() {
        let sig = parse_signature(
            "System.Void StardewValley.Network.OverlaidDictionary/KeysCollection::.ctor()",
        )
        .unwrap();
        let SymbolRef::Method(method) = sig else {
            panic!("expected method");
        };
        assert!(method.is_constructor());
        assert!(method.parameters.is_empty());
        assert_eq!(
            method.declaring_type.namespace(),
            "StardewValley.Network"
        );
    }

    #[test]
    fn test_canonicalize_whitespace() {
        assert_eq!(
            canonicalize("  System.Void   OldType::Foo( System.Int32 , System.String )").unwrap(),
            "System.Void OldType::Foo(System.Int32,System.String)"
        );
        assert_eq!(
            canonicalize("Netcode.NetRef`1< StardewValley.Farmer >").unwrap(),
            "Netcode.NetRef`1<StardewValley.Farmer>"
        );
    }

    #[test]
    fn test_parse_type_list_respects_generics() {
        let types = parse_type_list("System.String, Netcode.NetFieldBase`2<System.Int32,Netcode.NetInt>").unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(types[1].generic_arguments.len(), 2);
        assert!(parse_type_list("").unwrap().is_empty());
        assert!(parse_type_list("System.String,").is_err());
    }

    #[test]
    fn test_malformed_signatures() {
        for text in [
            "",
            "System.Void",
            "System.Void OldType::",
            "System.Void OldType::Foo(",
            "System.Void OldType::Foo(System.Int32",
            "Netcode.NetRef`1<>",
            "System.Void OldType::Foo() trailing",
        ] {
            let result = if text.contains("::") {
                parse_signature(text).map(|s| s.full_name())
            } else if text.is_empty() {
                parse_type(text).map(|t| t.full_name())
            } else {
                parse_signature(text).map(|s| s.full_name())
            };
            assert!(
                matches!(result, Err(Error::Signature(_))),
                "'{text}' should not parse"
            );
        }
    }
}

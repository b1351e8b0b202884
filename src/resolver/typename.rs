//! Reflection type names as stored in type records.
//!
//! The grammar is the one of `Type.AssemblyQualifiedName`:
//!
//! ```text
//! Namespace.Outer+Inner`1[[Arg, ArgAsm]][,]*&, Assembly, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null
//! ```
//!
//! `+` separates nesting levels, a bracket group right after the name lists
//! generic arguments, and `[]`, `[,]`, `*` and `&` are applied left to right
//! around the element type. A backslash escapes the next character.

use std::str::FromStr;

use crate::{
    metadata::{AssemblyIdentity, ResolutionScope, TypeRef, TypeSig, Version},
    Error, Result,
};

/// A modifier applied around an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeModifier {
    /// `[]`
    SzArray,
    /// `[,]` or `[*]`, with the rank
    Array(u32),
    /// `*`
    Pointer,
    /// `&`
    ByRef,
}

/// A parsed type name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeName {
    /// Namespace of the outermost type
    pub namespace: String,
    /// Names from the outermost to the named type
    pub nesting: Vec<String>,
    /// Generic arguments spelled out in the name
    pub generic_args: Vec<TypeName>,
    /// Modifiers in application order
    pub modifiers: Vec<TypeModifier>,
    /// Defining assembly, if qualified
    pub assembly: Option<AssemblyIdentity>,
}

impl TypeName {
    /// Parses a type name.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for empty names, unbalanced brackets or an
    /// unparsable assembly identity.
    pub fn parse(text: &str) -> Result<Self> {
        let chars: Vec<char> = text.chars().collect();
        let parts = split_top_level(&chars, ',');
        let (type_part, assembly_part) = match parts.as_slice() {
            [only] => (*only, None),
            [first, rest @ ..] => (*first, Some(rest)),
            [] => return Err(malformed_error!("Empty type name")),
        };

        let mut name = parse_type_part(type_part)?;
        if let Some(parts) = assembly_part {
            name.assembly = Some(parse_assembly(parts)?);
        }
        Ok(name)
    }

    /// Returns the named type without modifiers or generic arguments.
    #[must_use]
    pub fn type_ref(&self) -> TypeRef {
        let mut names = self.nesting.iter();
        let outermost = names.next().cloned().unwrap_or_default();
        let mut type_ref = TypeRef::new(self.namespace.clone(), outermost);
        for inner in names {
            type_ref = TypeRef::nested(type_ref, inner.clone());
        }
        match &self.assembly {
            Some(identity) => type_ref.with_scope(ResolutionScope::Assembly(identity.clone())),
            None => type_ref,
        }
    }

    /// Wraps `element` in the modifiers of this name.
    #[must_use]
    pub fn apply_modifiers(&self, element: TypeSig) -> TypeSig {
        self.modifiers
            .iter()
            .fold(element, |inner, modifier| match modifier {
                TypeModifier::SzArray => TypeSig::SzArray(Box::new(inner)),
                TypeModifier::Array(rank) => TypeSig::Array {
                    element: Box::new(inner),
                    rank: *rank,
                },
                TypeModifier::Pointer => TypeSig::Ptr(Box::new(inner)),
                TypeModifier::ByRef => TypeSig::ByRef(Box::new(inner)),
            })
    }

    /// Returns the full name in `/` nesting notation, without modifiers.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.type_ref().full_name()
    }
}

impl FromStr for TypeName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TypeName::parse(s)
    }
}

/// Splits at `separator` outside brackets, honouring escapes.
fn split_top_level(chars: &[char], separator: char) -> Vec<&[char]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut escaped = false;
    for (index, &c) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&chars[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    if start < chars.len() || !parts.is_empty() {
        parts.push(&chars[start..]);
    }
    parts
}

fn trim(chars: &[char]) -> &[char] {
    let start = chars.iter().position(|c| !c.is_whitespace()).unwrap_or(chars.len());
    let end = chars.iter().rposition(|c| !c.is_whitespace()).map_or(start, |e| e + 1);
    &chars[start..end.max(start)]
}

fn parse_type_part(chars: &[char]) -> Result<TypeName> {
    let chars = trim(chars);

    // name runs up to the first unescaped modifier character
    let mut names: Vec<String> = vec![String::new()];
    let mut namespace_split: Option<usize> = None;
    let mut index = 0;
    while index < chars.len() {
        let c = chars[index];
        match c {
            '\\' => {
                index += 1;
                if let (Some(current), Some(&escaped)) = (names.last_mut(), chars.get(index)) {
                    current.push(escaped);
                }
            }
            '+' => names.push(String::new()),
            '[' | '*' | '&' => break,
            '.' if names.len() == 1 => {
                namespace_split = Some(names[0].len());
                names[0].push(c);
            }
            _ => {
                if let Some(current) = names.last_mut() {
                    current.push(c);
                }
            }
        }
        index += 1;
    }

    if names.iter().any(String::is_empty) {
        return Err(malformed_error!(
            "Invalid type name '{}'",
            chars.iter().collect::<String>()
        ));
    }

    let mut name = TypeName::default();
    if let Some(split) = namespace_split {
        name.namespace = names[0][..split].to_string();
        names[0] = names[0][split + 1..].to_string();
        if names[0].is_empty() {
            return Err(malformed_error!("Type name ends with a namespace separator"));
        }
    }
    name.nesting = names;

    let mut first_group = true;
    while index < chars.len() {
        match chars[index] {
            '*' => {
                name.modifiers.push(TypeModifier::Pointer);
                index += 1;
            }
            '&' => {
                name.modifiers.push(TypeModifier::ByRef);
                index += 1;
            }
            '[' => {
                let close = matching_bracket(chars, index)?;
                let inner = trim(&chars[index + 1..close]);
                if inner.is_empty() {
                    name.modifiers.push(TypeModifier::SzArray);
                } else if inner == ['*'] {
                    name.modifiers.push(TypeModifier::Array(1));
                } else if inner.iter().all(|c| *c == ',' || c.is_whitespace()) {
                    let rank = inner.iter().filter(|c| **c == ',').count() + 1;
                    name.modifiers.push(TypeModifier::Array(rank as u32));
                } else if first_group && name.modifiers.is_empty() {
                    name.generic_args = parse_generic_args(inner)?;
                } else {
                    return Err(malformed_error!("Unexpected bracket group in type name"));
                }
                index = close + 1;
            }
            c if c.is_whitespace() => index += 1,
            c => return Err(malformed_error!("Unexpected '{}' in type name", c)),
        }
        first_group = false;
    }
    Ok(name)
}

fn matching_bracket(chars: &[char], open: usize) -> Result<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (index, &c) in chars.iter().enumerate().skip(open) {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(index);
                }
            }
            _ => {}
        }
    }
    Err(malformed_error!("Unbalanced brackets in type name"))
}

fn parse_generic_args(inner: &[char]) -> Result<Vec<TypeName>> {
    split_top_level(inner, ',')
        .into_iter()
        .map(|arg| {
            let arg = trim(arg);
            match (arg.first(), arg.last()) {
                (Some('['), Some(']')) => {
                    TypeName::parse(&arg[1..arg.len() - 1].iter().collect::<String>())
                }

                _ => TypeName::parse(&arg.iter().collect::<String>()),
            }
        })
        .collect()
}

fn parse_assembly(parts: &[&[char]]) -> Result<AssemblyIdentity> {
    let mut parts = parts.iter().map(|p| trim(p).iter().collect::<String>());
    let simple = parts.next().unwrap_or_default();
    if simple.is_empty() {
        return Err(malformed_error!("Empty assembly name"));
    }

    let mut identity = AssemblyIdentity::new(simple);
    for part in parts {
        let Some((key, value)) = part.split_once('=') else {
            return Err(malformed_error!("Invalid assembly name component '{}'", part));
        };
        let value = value.trim();
        match key.trim() {
            "Version" => identity.version = Some(parse_version(value)?),
            "Culture" if value.eq_ignore_ascii_case("neutral") => identity.culture = None,
            "Culture" => identity.culture = Some(value.to_string()),
            "PublicKeyToken" if value.eq_ignore_ascii_case("null") => {
                identity.public_key_token = None;
            }
            "PublicKeyToken" => identity.public_key_token = Some(parse_hex(value)?),
            _ => {}
        }
    }
    Ok(identity)
}

fn parse_version(text: &str) -> Result<Version> {
    let mut components = [0u16; 4];
    let mut count = 0;
    for part in text.split('.') {
        if count == 4 {
            return Err(malformed_error!("Version '{}' has too many components", text));
        }
        components[count] = part
            .parse()
            .map_err(|_| malformed_error!("Invalid version '{}'", text))?;
        count += 1;
    }
    Ok(Version::new(
        components[0],
        components[1],
        components[2],
        components[3],
    ))
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(malformed_error!("Odd-length public key token '{}'", text));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| malformed_error!("Invalid public key token '{}'", text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembly_qualified() {
        let name: TypeName = "Foo.Bar, MyAsm, Version=1.0.0.0".parse().unwrap();
        assert_eq!(name.namespace, "Foo");
        assert_eq!(name.nesting, vec!["Bar".to_string()]);
        let assembly = name.assembly.as_ref().unwrap();
        assert_eq!(assembly.name, "MyAsm");
        assert_eq!(assembly.version, Some(Version::new(1, 0, 0, 0)));

        let type_ref = name.type_ref();
        assert!(type_ref.is_external());
        assert_eq!(type_ref.full_name(), "Foo.Bar");
    }

    #[test]
    fn test_modifiers_apply_in_order() {
        let name = TypeName::parse("Foo.Bar[][,]*&").unwrap();
        assert_eq!(
            name.modifiers,
            vec![
                TypeModifier::SzArray,
                TypeModifier::Array(2),
                TypeModifier::Pointer,
                TypeModifier::ByRef
            ]
        );
        let sig = name.apply_modifiers(TypeSig::Class(name.type_ref()));
        assert_eq!(sig.full_name(), "Foo.Bar[][,]*&");
    }

    #[test]
    fn test_nested_and_escaped() {
        let name = TypeName::parse("A.B.Outer+Inner\\+Odd+Deep").unwrap();
        assert_eq!(name.namespace, "A.B");
        assert_eq!(name.nesting, vec!["Outer", "Inner+Odd", "Deep"]);
        assert_eq!(name.full_name(), "A.B.Outer/Inner+Odd/Deep");
    }

    #[test]
    fn test_generic_arguments_in_name() {
        let name = TypeName::parse(
            "System.Collections.Generic.Dictionary`2[[System.String, mscorlib],[Foo.Bar, MyAsm]][], mscorlib, Culture=neutral, PublicKeyToken=b77a5c561934e089",
        )
        .unwrap();
        assert_eq!(name.nesting, vec!["Dictionary`2"]);
        assert_eq!(name.generic_args.len(), 2);
        assert_eq!(name.generic_args[1].assembly.as_ref().unwrap().name, "MyAsm");
        assert_eq!(name.modifiers, vec![TypeModifier::SzArray]);
        let assembly = name.assembly.unwrap();
        assert_eq!(assembly.culture, None);
        assert_eq!(
            assembly.public_key_token,
            Some(vec![0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89])
        );
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(TypeName::parse("").is_err());
        assert!(TypeName::parse("Foo.").is_err());
        assert!(TypeName::parse("Foo[").is_err());
        assert!(TypeName::parse("Foo+").is_err());
        assert!(TypeName::parse("Foo, Asm, Version=x").is_err());
        assert!(TypeName::parse("Foo, ").is_err());
    }
}

//! Validated, linked type model.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::{
    errors::{CodecError, ModelError},
    schema::{ContentKind, Element, Format, Schema, SequenceElement, TypeDef, TypeKind},
};

/// An immutable name-to-type map with every reference resolved and every
/// inherited representation attribute merged in. Build with [ValidatedModel::compile].
#[derive(Debug, Clone)]
pub struct ValidatedModel {
    types: BTreeMap<String, TypeDef>,
}

impl ValidatedModel {
    /// Validates `schema`: collects the types, then links base types and checks every reference.
    pub fn compile(schema: Schema) -> Result<Self, ModelError> {
        let raw = collect(schema)?;

        let mut linked = BTreeMap::new();
        for name in raw.keys() {
            link_base(&raw, &mut linked, name, &mut Vec::new())?;
        }

        let formats: BTreeMap<String, Format> = linked
            .iter()
            .map(|(name, def)| (name.clone(), def.format.clone()))
            .collect();

        for def in linked.values_mut() {
            check_type(def, &formats)?;
        }

        debug!("validated model with {} types", linked.len());
        Ok(Self { types: linked })
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Whether the element holds a list: it has an occurs-count expression or may occur more than once.
    pub fn is_list(&self, element: &SequenceElement) -> bool {
        element.occurs_count.is_some() || !element.max_occurs.reached(1)
    }

    /// Whether the element occurs at most once and may be absent.
    pub fn is_optional(&self, element: &SequenceElement) -> bool {
        element.min_occurs == 0 && !self.is_list(element)
    }

    /// Looks up a type referenced while encoding or decoding.
    pub fn require_type(&self, name: &str) -> Result<&TypeDef, CodecError> {
        self.get_type(name)
            .ok_or_else(|| CodecError::UnknownType(name.to_string()))
    }

    /// Looks up a type that must be a simple type, such as a tag or length field type.
    pub fn require_simple(&self, name: &str, role: &'static str) -> Result<&TypeDef, CodecError> {
        let def = self.require_type(name)?;
        match def.kind {
            TypeKind::Simple(_) => Ok(def),
            _ => Err(CodecError::NotSimpleType {
                role,
                type_name: name.to_string(),
            }),
        }
    }

    /// All types, ordered by name.
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TryFrom<Schema> for ValidatedModel {
    type Error = ModelError;

    fn try_from(schema: Schema) -> Result<Self, Self::Error> {
        ValidatedModel::compile(schema)
    }
}

fn collect(schema: Schema) -> Result<BTreeMap<String, TypeDef>, ModelError> {
    let mut raw = BTreeMap::new();
    for def in schema.types {
        if raw.contains_key(&def.name) {
            return Err(ModelError::DuplicateType(def.name));
        }
        raw.insert(def.name.clone(), def);
    }

    Ok(raw)
}

/// Merges the transitively resolved base of `name` into it. Each type is linked once.
fn link_base(
    raw: &BTreeMap<String, TypeDef>,
    linked: &mut BTreeMap<String, TypeDef>,
    name: &str,
    visiting: &mut Vec<String>,
) -> Result<(), ModelError> {
    if linked.contains_key(name) {
        return Ok(());
    }
    if visiting.iter().any(|v| v == name) {
        return Err(ModelError::CyclicBaseType(name.to_string()));
    }

    let Some(def) = raw.get(name) else {
        return Ok(());
    };
    let mut def = def.clone();

    if let Some(base_name) = &def.base {
        if !raw.contains_key(base_name) {
            return Err(ModelError::UndefinedType {
                name: base_name.clone(),
                referenced_by: name.to_string(),
            });
        }

        visiting.push(name.to_string());
        link_base(raw, linked, base_name, visiting)?;
        visiting.pop();

        if let Some(base) = linked.get(base_name) {
            def.format.merge_from(&base.format);
            inherit_content(&mut def.kind, base.content());
            if def.discriminator.is_none() {
                def.discriminator = base.discriminator.clone();
            }
        }
    }

    linked.insert(name.to_string(), def);
    Ok(())
}

fn inherit_content(kind: &mut TypeKind, base: Option<ContentKind>) {
    match kind {
        TypeKind::Simple(simple) if simple.content.is_none() => simple.content = base,
        TypeKind::Enumeration(enumeration) if enumeration.content.is_none() => {
            enumeration.content = base
        }
        _ => {}
    }
}

fn resolve(
    formats: &BTreeMap<String, Format>,
    name: &str,
    referenced_by: &str,
) -> Result<Format, ModelError> {
    formats
        .get(name)
        .cloned()
        .ok_or_else(|| ModelError::UndefinedType {
            name: name.to_string(),
            referenced_by: referenced_by.to_string(),
        })
}

fn complete_element(
    element: &mut Element,
    formats: &BTreeMap<String, Format>,
    seen: &mut BTreeSet<String>,
    owner: &str,
) -> Result<(), ModelError> {
    if !seen.insert(element.name.clone()) {
        return Err(ModelError::DuplicateElement {
            type_name: owner.to_string(),
            element: element.name.clone(),
        });
    }

    let type_format = resolve(formats, &element.type_name, owner)?;
    element.format.merge_from(&type_format);
    Ok(())
}

fn check_type(def: &mut TypeDef, formats: &BTreeMap<String, Format>) -> Result<(), ModelError> {
    let owner = def.name.clone();
    let tagged = matches!(def.kind, TypeKind::TaggedSequence(_));

    match &mut def.kind {
        TypeKind::Simple(_) => {}
        TypeKind::Enumeration(enumeration) => {
            let mut seen = BTreeSet::new();
            for element in &enumeration.elements {
                if !seen.insert(element.name.as_str()) {
                    return Err(ModelError::DuplicateEnumerationElement {
                        enumeration: owner,
                        element: element.name.clone(),
                    });
                }
            }
        }
        TypeKind::Sequence(seq) | TypeKind::TaggedSequence(seq) => {
            if tagged && seq.tag.is_none() {
                return Err(ModelError::MissingTag(owner));
            }

            if let Some(tag) = &seq.tag {
                resolve(formats, &tag.type_name, &owner)?;
                if tag.expected_value().is_none() {
                    return Err(ModelError::InvalidTag {
                        type_name: owner,
                        hex_value: tag.hex_value.clone(),
                    });
                }
            }

            if let Some(length_field) = &seq.length_field {
                resolve(formats, &length_field.type_name, &owner)?;
            }

            let mut seen = BTreeSet::new();
            for element in &mut seq.elements {
                complete_element(&mut element.element, formats, &mut seen, &owner)?;
            }
        }
        TypeKind::Choice(choice) => {
            let mut seen = BTreeSet::new();
            for element in &mut choice.elements {
                complete_element(element, formats, &mut seen, &owner)?;
            }
        }
    }

    Ok(())
}

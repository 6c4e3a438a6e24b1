//! Directory schema: attribute types, object classes and entry checks.
//!
//! The standard schema is declared in RFC 4512 definition syntax and read
//! through the same parser as custom schemas, so a custom `cn=schema` LDIF
//! can extend or override any standard definition by name or OID.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::sync::Arc;

use thiserror::Error;

use crate::directory::entry::Entry;
use crate::directory::ldif::{LdifError, LdifReader};

const STANDARD_ATTRIBUTE_TYPES: &[&str] = &[
    "( 2.5.4.0 NAME 'objectClass' )",
    "( 2.5.4.1 NAME 'aliasedObjectName' SINGLE-VALUE )",
    "( 2.5.4.41 NAME 'name' )",
    "( 2.5.4.3 NAME ( 'cn' 'commonName' ) SUP name )",
    "( 2.5.4.4 NAME ( 'sn' 'surname' ) SUP name )",
    "( 2.5.4.5 NAME 'serialNumber' )",
    "( 2.5.4.6 NAME ( 'c' 'countryName' ) SUP name SINGLE-VALUE )",
    "( 2.5.4.7 NAME ( 'l' 'localityName' ) SUP name )",
    "( 2.5.4.8 NAME ( 'st' 'stateOrProvinceName' ) SUP name )",
    "( 2.5.4.9 NAME ( 'street' 'streetAddress' ) )",
    "( 2.5.4.10 NAME ( 'o' 'organizationName' ) SUP name )",
    "( 2.5.4.11 NAME ( 'ou' 'organizationalUnitName' ) SUP name )",
    "( 2.5.4.12 NAME 'title' SUP name )",
    "( 2.5.4.13 NAME 'description' )",
    "( 2.5.4.14 NAME 'searchGuide' )",
    "( 2.5.4.15 NAME 'businessCategory' )",
    "( 2.5.4.16 NAME 'postalAddress' )",
    "( 2.5.4.17 NAME 'postalCode' )",
    "( 2.5.4.18 NAME 'postOfficeBox' )",
    "( 2.5.4.19 NAME 'physicalDeliveryOfficeName' )",
    "( 2.5.4.20 NAME 'telephoneNumber' )",
    "( 2.5.4.21 NAME 'telexNumber' )",
    "( 2.5.4.23 NAME 'facsimileTelephoneNumber' )",
    "( 2.5.4.24 NAME 'x121Address' )",
    "( 2.5.4.25 NAME 'internationalISDNNumber' )",
    "( 2.5.4.26 NAME 'registeredAddress' SUP postalAddress )",
    "( 2.5.4.27 NAME 'destinationIndicator' )",
    "( 2.5.4.28 NAME 'preferredDeliveryMethod' SINGLE-VALUE )",
    "( 2.5.4.31 NAME 'member' )",
    "( 2.5.4.32 NAME 'owner' )",
    "( 2.5.4.33 NAME 'roleOccupant' )",
    "( 2.5.4.34 NAME 'seeAlso' )",
    "( 2.5.4.35 NAME 'userPassword' )",
    "( 2.5.4.36 NAME 'userCertificate' )",
    "( 2.5.4.42 NAME 'givenName' SUP name )",
    "( 2.5.4.43 NAME 'initials' SUP name )",
    "( 2.5.4.44 NAME 'generationQualifier' SUP name )",
    "( 2.5.4.45 NAME 'x500UniqueIdentifier' )",
    "( 2.5.4.46 NAME 'dnQualifier' )",
    "( 2.5.4.50 NAME 'uniqueMember' )",
    "( 2.5.4.51 NAME 'houseIdentifier' )",
    "( 0.9.2342.19200300.100.1.1 NAME ( 'uid' 'userid' ) )",
    "( 0.9.2342.19200300.100.1.3 NAME ( 'mail' 'rfc822Mailbox' ) )",
    "( 0.9.2342.19200300.100.1.6 NAME 'roomNumber' )",
    "( 0.9.2342.19200300.100.1.7 NAME 'photo' )",
    "( 0.9.2342.19200300.100.1.9 NAME 'host' )",
    "( 0.9.2342.19200300.100.1.10 NAME 'manager' )",
    "( 0.9.2342.19200300.100.1.20 NAME ( 'homePhone' 'homeTelephoneNumber' ) )",
    "( 0.9.2342.19200300.100.1.21 NAME 'secretary' )",
    "( 0.9.2342.19200300.100.1.25 NAME ( 'dc' 'domainComponent' ) SINGLE-VALUE )",
    "( 0.9.2342.19200300.100.1.39 NAME 'homePostalAddress' )",
    "( 0.9.2342.19200300.100.1.41 NAME ( 'mobile' 'mobileTelephoneNumber' ) )",
    "( 0.9.2342.19200300.100.1.42 NAME ( 'pager' 'pagerTelephoneNumber' ) )",
    "( 0.9.2342.19200300.100.1.55 NAME 'audio' )",
    "( 0.9.2342.19200300.100.1.60 NAME 'jpegPhoto' )",
    "( 1.3.6.1.4.1.250.1.57 NAME 'labeledURI' )",
    "( 2.16.840.1.113730.3.1.1 NAME 'carLicense' )",
    "( 2.16.840.1.113730.3.1.2 NAME 'departmentNumber' )",
    "( 2.16.840.1.113730.3.1.3 NAME 'employeeNumber' SINGLE-VALUE )",
    "( 2.16.840.1.113730.3.1.4 NAME 'employeeType' )",
    "( 2.16.840.1.113730.3.1.34 NAME 'ref' )",
    "( 2.16.840.1.113730.3.1.39 NAME 'preferredLanguage' SINGLE-VALUE )",
    "( 2.16.840.1.113730.3.1.241 NAME 'displayName' SINGLE-VALUE )",
];

const STANDARD_OBJECT_CLASSES: &[&str] = &[
    "( 2.5.6.0 NAME 'top' ABSTRACT MUST objectClass )",
    "( 2.5.6.1 NAME 'alias' SUP top STRUCTURAL MUST aliasedObjectName )",
    "( 2.5.6.2 NAME 'country' SUP top STRUCTURAL MUST c MAY ( searchGuide $ description ) )",
    "( 2.5.6.3 NAME 'locality' SUP top STRUCTURAL \
       MAY ( street $ seeAlso $ searchGuide $ st $ l $ description ) )",
    "( 2.5.6.4 NAME 'organization' SUP top STRUCTURAL MUST o \
       MAY ( userPassword $ searchGuide $ seeAlso $ businessCategory $ x121Address $ \
       registeredAddress $ destinationIndicator $ preferredDeliveryMethod $ telexNumber $ \
       telephoneNumber $ internationalISDNNumber $ facsimileTelephoneNumber $ street $ \
       postOfficeBox $ postalCode $ postalAddress $ physicalDeliveryOfficeName $ st $ l $ \
       description ) )",
    "( 2.5.6.5 NAME 'organizationalUnit' SUP top STRUCTURAL MUST ou \
       MAY ( userPassword $ searchGuide $ seeAlso $ businessCategory $ x121Address $ \
       registeredAddress $ destinationIndicator $ preferredDeliveryMethod $ telexNumber $ \
       telephoneNumber $ internationalISDNNumber $ facsimileTelephoneNumber $ street $ \
       postOfficeBox $ postalCode $ postalAddress $ physicalDeliveryOfficeName $ st $ l $ \
       description ) )",
    "( 2.5.6.6 NAME 'person' SUP top STRUCTURAL MUST ( sn $ cn ) \
       MAY ( userPassword $ telephoneNumber $ seeAlso $ description ) )",
    "( 2.5.6.7 NAME 'organizationalPerson' SUP person STRUCTURAL \
       MAY ( title $ x121Address $ registeredAddress $ destinationIndicator $ \
       preferredDeliveryMethod $ telexNumber $ telephoneNumber $ internationalISDNNumber $ \
       facsimileTelephoneNumber $ street $ postOfficeBox $ postalCode $ postalAddress $ \
       physicalDeliveryOfficeName $ ou $ st $ l ) )",
    "( 2.5.6.8 NAME 'organizationalRole' SUP top STRUCTURAL MUST cn \
       MAY ( x121Address $ registeredAddress $ destinationIndicator $ preferredDeliveryMethod $ \
       telexNumber $ telephoneNumber $ internationalISDNNumber $ facsimileTelephoneNumber $ \
       seeAlso $ roleOccupant $ street $ postOfficeBox $ postalCode $ postalAddress $ \
       physicalDeliveryOfficeName $ ou $ st $ l $ description ) )",
    "( 2.5.6.9 NAME 'groupOfNames' SUP top STRUCTURAL MUST ( member $ cn ) \
       MAY ( businessCategory $ seeAlso $ owner $ ou $ o $ description ) )",
    "( 2.5.6.11 NAME 'applicationProcess' SUP top STRUCTURAL MUST cn \
       MAY ( seeAlso $ ou $ l $ description ) )",
    "( 2.5.6.14 NAME 'device' SUP top STRUCTURAL MUST cn \
       MAY ( serialNumber $ seeAlso $ owner $ ou $ o $ l $ description ) )",
    "( 2.5.6.17 NAME 'groupOfUniqueNames' SUP top STRUCTURAL MUST ( uniqueMember $ cn ) \
       MAY ( businessCategory $ seeAlso $ owner $ ou $ o $ description ) )",
    "( 2.16.840.1.113730.3.2.2 NAME 'inetOrgPerson' SUP organizationalPerson STRUCTURAL \
       MAY ( audio $ businessCategory $ carLicense $ departmentNumber $ displayName $ \
       employeeNumber $ employeeType $ givenName $ homePhone $ homePostalAddress $ initials $ \
       jpegPhoto $ labeledURI $ mail $ manager $ mobile $ o $ pager $ photo $ roomNumber $ \
       secretary $ uid $ userCertificate $ x500UniqueIdentifier $ preferredLanguage ) )",
    "( 2.16.840.1.113730.3.2.6 NAME 'referral' SUP top STRUCTURAL MUST ref )",
    "( 0.9.2342.19200300.100.4.5 NAME 'account' SUP top STRUCTURAL MUST uid \
       MAY ( description $ seeAlso $ l $ o $ ou $ host ) )",
    "( 0.9.2342.19200300.100.4.13 NAME 'domain' SUP top STRUCTURAL MUST dc \
       MAY ( userPassword $ searchGuide $ seeAlso $ businessCategory $ x121Address $ \
       registeredAddress $ destinationIndicator $ preferredDeliveryMethod $ telexNumber $ \
       telephoneNumber $ internationalISDNNumber $ facsimileTelephoneNumber $ street $ \
       postOfficeBox $ postalCode $ postalAddress $ physicalDeliveryOfficeName $ st $ l $ \
       description $ o $ associatedName ) )",
    "( 0.9.2342.19200300.100.4.19 NAME 'simpleSecurityObject' SUP top AUXILIARY MUST userPassword )",
    "( 1.3.6.1.4.1.1466.344 NAME 'dcObject' SUP top AUXILIARY MUST dc )",
    "( 1.3.6.1.1.3.1 NAME 'uidObject' SUP top AUXILIARY MUST uid )",
    "( 1.3.6.1.4.1.1466.101.120.111 NAME 'extensibleObject' SUP top AUXILIARY )",
];

const EXTENSIBLE_OBJECT: &str = "extensibleobject";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid schema definition '{definition}': {reason}")]
    Definition { definition: String, reason: String },

    #[error("could not read schema LDIF: {0}")]
    Ldif(#[from] LdifError),

    #[error("entry '{dn}' has no objectClass")]
    MissingObjectClass { dn: String },

    #[error("entry '{dn}' uses undefined object class '{class}'")]
    UnknownObjectClass { dn: String, class: String },

    #[error("entry '{dn}' has no structural object class")]
    NoStructuralClass { dn: String },

    #[error("entry '{dn}' is missing required attribute '{attribute}'")]
    MissingAttribute { dn: String, attribute: String },

    #[error("entry '{dn}' uses undefined attribute '{attribute}'")]
    UnknownAttribute { dn: String, attribute: String },

    #[error("attribute '{attribute}' is not allowed by the object classes of '{dn}'")]
    AttributeNotAllowed { dn: String, attribute: String },

    #[error("single-valued attribute '{attribute}' of '{dn}' has several values")]
    MultipleValues { dn: String, attribute: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Abstract,
    Structural,
    Auxiliary,
}

#[derive(Debug, Clone)]
pub struct AttributeType {
    pub oid: String,
    pub names: Vec<String>,
    pub sup: Option<String>,
    pub single_value: bool,
}

#[derive(Debug, Clone)]
pub struct ObjectClass {
    pub oid: String,
    pub names: Vec<String>,
    pub kind: ClassKind,
    pub sup: Vec<String>,
    pub must: Vec<String>,
    pub may: Vec<String>,
}

/// A set of attribute types and object classes, addressable by any of
/// their names (case-insensitive) or OID.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    attribute_types: HashMap<String, Arc<AttributeType>>,
    object_classes: HashMap<String, Arc<ObjectClass>>,
}

impl Schema {
    /// The standard user schema (RFC 4519, RFC 2798 and common auxiliaries).
    pub fn standard() -> Result<Self, SchemaError> {
        let mut schema = Self::default();
        for definition in STANDARD_ATTRIBUTE_TYPES {
            schema.insert_attribute_type(parse_attribute_type(definition)?);
        }
        for definition in STANDARD_OBJECT_CLASSES {
            schema.insert_object_class(parse_object_class(definition)?);
        }
        Ok(schema)
    }

    /// Read `attributeTypes` and `objectClasses` values from every entry of
    /// a schema LDIF.
    pub fn from_ldif<R: BufRead>(input: R) -> Result<Self, SchemaError> {
        let mut schema = Self::default();
        let mut reader = LdifReader::new(input);
        while let Some(entry) = reader.read_entry()? {
            if let Some(attribute) = entry.attribute("attributeTypes") {
                for definition in attribute.string_values() {
                    schema.insert_attribute_type(parse_attribute_type(&definition)?);
                }
            }
            if let Some(attribute) = entry.attribute("objectClasses") {
                for definition in attribute.string_values() {
                    schema.insert_object_class(parse_object_class(&definition)?);
                }
            }
        }
        Ok(schema)
    }

    /// Add every definition of `other`, replacing same-named definitions.
    pub fn merge(&mut self, other: Schema) {
        for (key, attribute) in other.attribute_types {
            self.attribute_types.insert(key, attribute);
        }
        for (key, class) in other.object_classes {
            self.object_classes.insert(key, class);
        }
    }

    pub fn attribute_type(&self, name: &str) -> Option<&AttributeType> {
        self.attribute_types
            .get(&name.to_ascii_lowercase())
            .map(Arc::as_ref)
    }

    pub fn object_class(&self, name: &str) -> Option<&ObjectClass> {
        self.object_classes
            .get(&name.to_ascii_lowercase())
            .map(Arc::as_ref)
    }

    /// Number of distinct object classes.
    pub fn object_class_count(&self) -> usize {
        self.object_classes
            .values()
            .map(|c| c.oid.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Check `entry` against the schema.
    pub fn validate_entry(&self, entry: &Entry) -> Result<(), SchemaError> {
        let dn = entry.dn().as_str().to_string();
        let declared = entry.object_classes();
        if declared.is_empty() {
            return Err(SchemaError::MissingObjectClass { dn });
        }

        let mut classes: Vec<&ObjectClass> = Vec::new();
        let mut seen = HashSet::new();
        let mut pending: Vec<String> = declared;
        while let Some(name) = pending.pop() {
            let class = self
                .object_class(&name)
                .ok_or_else(|| SchemaError::UnknownObjectClass {
                    dn: dn.clone(),
                    class: name.clone(),
                })?;
            if seen.insert(class.oid.clone()) {
                pending.extend(class.sup.iter().cloned());
                classes.push(class);
            }
        }

        if !classes.iter().any(|c| c.kind == ClassKind::Structural) {
            return Err(SchemaError::NoStructuralClass { dn });
        }

        let extensible = classes
            .iter()
            .any(|c| c.names.iter().any(|n| n.eq_ignore_ascii_case(EXTENSIBLE_OBJECT)));

        let mut allowed = HashSet::new();
        for class in &classes {
            for name in &class.must {
                if entry.attribute(name).is_none() && !self.has_alias_in(entry, name) {
                    return Err(SchemaError::MissingAttribute {
                        dn,
                        attribute: name.clone(),
                    });
                }
                allowed.insert(self.canonical(name));
            }
            for name in &class.may {
                allowed.insert(self.canonical(name));
            }
        }

        for attribute in entry.attributes() {
            let Some(attribute_type) = self.attribute_type(&attribute.name) else {
                if extensible {
                    continue;
                }
                return Err(SchemaError::UnknownAttribute {
                    dn,
                    attribute: attribute.name.clone(),
                });
            };
            if !extensible && !allowed.contains(&attribute_type.oid) {
                return Err(SchemaError::AttributeNotAllowed {
                    dn,
                    attribute: attribute.name.clone(),
                });
            }
            if attribute_type.single_value && attribute.values.len() > 1 {
                return Err(SchemaError::MultipleValues {
                    dn,
                    attribute: attribute.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn canonical(&self, name: &str) -> String {
        self.attribute_type(name)
            .map(|a| a.oid.clone())
            .unwrap_or_else(|| name.to_ascii_lowercase())
    }

    // `cn` is satisfied by a `commonName` attribute and the other way round
    fn has_alias_in(&self, entry: &Entry, name: &str) -> bool {
        self.attribute_type(name)
            .map(|a| a.names.iter().any(|alias| entry.attribute(alias).is_some()))
            .unwrap_or(false)
    }

    fn insert_attribute_type(&mut self, attribute: AttributeType) {
        let attribute = Arc::new(attribute);
        for key in keys(&attribute.oid, &attribute.names) {
            self.attribute_types.insert(key, Arc::clone(&attribute));
        }
    }

    fn insert_object_class(&mut self, class: ObjectClass) {
        let class = Arc::new(class);
        for key in keys(&class.oid, &class.names) {
            self.object_classes.insert(key, Arc::clone(&class));
        }
    }
}

fn keys<'a>(oid: &'a str, names: &'a [String]) -> impl Iterator<Item = String> + 'a {
    std::iter::once(oid.to_ascii_lowercase()).chain(names.iter().map(|n| n.to_ascii_lowercase()))
}

const FLAGS: &[&str] = &[
    "OBSOLETE",
    "ABSTRACT",
    "STRUCTURAL",
    "AUXILIARY",
    "SINGLE-VALUE",
    "COLLECTIVE",
    "NO-USER-MODIFICATION",
];

/// A parsed `( oid KEYWORD value ... )` definition.
struct Definition {
    oid: String,
    fields: HashMap<String, Vec<String>>,
}

impl Definition {
    fn parse(text: &str) -> Result<Self, SchemaError> {
        let invalid = |reason: &str| SchemaError::Definition {
            definition: text.to_string(),
            reason: reason.to_string(),
        };

        let tokens = tokenize(text).map_err(invalid)?;
        let mut tokens = tokens.into_iter().peekable();
        if tokens.next() != Some(Token::Open) {
            return Err(invalid("expected '('"));
        }
        let oid = match tokens.next() {
            Some(Token::Word(oid)) => oid,
            _ => return Err(invalid("expected an OID")),
        };

        let mut fields = HashMap::new();
        loop {
            let keyword = match tokens.next() {
                Some(Token::Close) => break,
                Some(Token::Word(word)) => word.to_ascii_uppercase(),
                _ => return Err(invalid("unexpected token")),
            };
            if FLAGS.contains(&keyword.as_str()) {
                fields.insert(keyword, Vec::new());
                continue;
            }
            let values = match tokens.next() {
                Some(Token::Word(value)) | Some(Token::Quoted(value)) => vec![value],
                Some(Token::Open) => {
                    let mut values = Vec::new();
                    loop {
                        match tokens.next() {
                            Some(Token::Close) => break,
                            Some(Token::Dollar) => continue,
                            Some(Token::Word(value)) | Some(Token::Quoted(value)) => values.push(value),
                            _ => return Err(invalid("unterminated list")),
                        }
                    }
                    values
                }
                _ => return Err(invalid("missing value")),
            };
            fields.insert(keyword, values);
        }
        if tokens.next().is_some() {
            return Err(invalid("trailing content after ')'"));
        }
        Ok(Self { oid, fields })
    }

    fn values(&self, keyword: &str) -> Vec<String> {
        self.fields.get(keyword).cloned().unwrap_or_default()
    }

    fn has(&self, keyword: &str) -> bool {
        self.fields.contains_key(keyword)
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Open,
    Close,
    Dollar,
    Word(String),
    Quoted(String),
}

fn tokenize(text: &str) -> Result<Vec<Token>, &'static str> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '$' => {
                chars.next();
                tokens.push(Token::Dollar);
            }
            '\'' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => value.push(c),
                        None => return Err("unterminated quoted string"),
                    }
                }
                tokens.push(Token::Quoted(value));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '$' | '\'') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

fn parse_attribute_type(text: &str) -> Result<AttributeType, SchemaError> {
    let definition = Definition::parse(text)?;
    Ok(AttributeType {
        names: definition.values("NAME"),
        sup: definition.values("SUP").into_iter().next(),
        single_value: definition.has("SINGLE-VALUE"),
        oid: definition.oid,
    })
}

fn parse_object_class(text: &str) -> Result<ObjectClass, SchemaError> {
    let definition = Definition::parse(text)?;
    let kind = if definition.has("ABSTRACT") {
        ClassKind::Abstract
    } else if definition.has("AUXILIARY") {
        ClassKind::Auxiliary
    } else {
        ClassKind::Structural
    };
    Ok(ObjectClass {
        names: definition.values("NAME"),
        kind,
        sup: definition.values("SUP"),
        must: definition.values("MUST"),
        may: definition.values("MAY"),
        oid: definition.oid,
    })
}

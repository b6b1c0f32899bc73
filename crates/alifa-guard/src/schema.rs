//! # Field Validators
//!
//! One schema per input form, written as tagged per-field constraint records
//! and evaluated by a single generic [`validate`]. Every field is checked and
//! every violation collected, so the form can highlight all of them at once.
//!
//! Lengths are counted in characters, bounds are inclusive. A JSON `null` on an
//! optional field counts as absent. Keys the schema does not know are dropped
//! from the parsed record.

use alifa_core::FieldError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Fields that passed validation, keyed by field name.
pub type ParsedRecord = Map<String, Value>;

const REQUIRED: &str = "Champ requis";
const EXPECTED_TEXT: &str = "Texte attendu";
const EXPECTED_BOOLEAN: &str = "Valeur oui/non attendue";
const EXPECTED_OBJECT: &str = "Formulaire invalide";

const DISPLAY_NAME_REQUIRED: &str = "Le nom d'affichage est requis";
const DISPLAY_NAME_TOO_LONG: &str = "Le nom d'affichage ne peut pas dépasser 50 caractères";
const EMAIL_INVALID: &str = "Email invalide";
const EMAIL_TOO_LONG: &str = "Email trop long";

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[A-Z0-9_'+\-.]*[A-Z0-9_+\-]@([A-Z0-9][A-Z0-9\-]*\.)+[A-Z]{2,}$")
        .expect("invalid EMAIL_PATTERN")
});

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9\s\-()]{10,}$").expect("invalid PHONE_PATTERN"));

/// Email syntax: no leading dot, no consecutive dots, a dotted domain.
pub fn is_email(value: &str) -> bool {
    !value.starts_with('.') && !value.contains("..") && EMAIL_PATTERN.is_match(value)
}

/// Loose international phone: optional `+`, then 10 or more digits, spaces,
/// dashes or parentheses.
pub fn is_phone(value: &str) -> bool {
    PHONE_PATTERN.is_match(value)
}

pub fn is_url(value: &str) -> bool {
    url::Url::parse(value).is_ok()
}

fn has_lowercase(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_lowercase())
}

fn has_uppercase(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_uppercase())
}

fn has_digit(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
    /// Optional, and the empty string is accepted without further checks.
    OptionalOrEmpty,
}

#[derive(Debug, Clone, Copy)]
pub enum TextRule {
    MinChars(usize, &'static str),
    MaxChars(usize, &'static str),
    Check(fn(&str) -> bool, &'static str),
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text(&'static [TextRule]),
    Boolean,
    OneOf(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub presence: Presence,
    pub kind: FieldKind,
}

impl FieldSpec {
    const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self { name, presence: Presence::Required, kind }
    }

    const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self { name, presence: Presence::Optional, kind }
    }

    const fn optional_or_empty(name: &'static str, kind: FieldKind) -> Self {
        Self { name, presence: Presence::OptionalOrEmpty, kind }
    }

    fn check(&self, value: &Value, errors: &mut Vec<FieldError>) {
        match self.kind {
            FieldKind::Text(rules) => {
                let Some(text) = value.as_str() else {
                    errors.push(FieldError::new(self.name, EXPECTED_TEXT));
                    return;
                };
                if self.presence == Presence::OptionalOrEmpty && text.is_empty() {
                    return;
                }
                let chars = text.chars().count();
                for rule in rules {
                    let failed = match *rule {
                        TextRule::MinChars(min, message) => (chars < min).then_some(message),
                        TextRule::MaxChars(max, message) => (chars > max).then_some(message),
                        TextRule::Check(predicate, message) => (!predicate(text)).then_some(message),
                    };
                    if let Some(message) = failed {
                        errors.push(FieldError::new(self.name, message));
                    }
                }
            }
            FieldKind::Boolean => {
                if !value.is_boolean() {
                    errors.push(FieldError::new(self.name, EXPECTED_BOOLEAN));
                }
            }
            FieldKind::OneOf(options) => {
                let accepted = value.as_str().is_some_and(|v| options.contains(&v));
                if !accepted {
                    errors.push(FieldError::new(
                        self.name,
                        format!("Valeur invalide, attendu : {}", options.join(" | ")),
                    ));
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct Schema {
    pub name: SchemaName,
    pub fields: &'static [FieldSpec],
}

use FieldKind::*;
use TextRule::*;

static POST: Schema = Schema {
    name: SchemaName::Post,
    fields: &[
        FieldSpec::required(
            "content",
            Text(&[
                MinChars(1, "Le contenu ne peut pas être vide"),
                MaxChars(2000, "Le contenu ne peut pas dépasser 2000 caractères"),
            ]),
        ),
        FieldSpec::optional("event_title", Text(&[MaxChars(100, "Le titre ne peut pas dépasser 100 caractères")])),
        FieldSpec::optional(
            "event_description",
            Text(&[MaxChars(500, "La description ne peut pas dépasser 500 caractères")]),
        ),
        FieldSpec::optional("location", Text(&[MaxChars(200, "La localisation ne peut pas dépasser 200 caractères")])),
        FieldSpec::optional("event_date", Text(&[])),
        FieldSpec::optional("event_time", Text(&[])),
    ],
};

static COMMENT: Schema = Schema {
    name: SchemaName::Comment,
    fields: &[FieldSpec::required(
        "content",
        Text(&[
            MinChars(1, "Le commentaire ne peut pas être vide"),
            MaxChars(500, "Le commentaire ne peut pas dépasser 500 caractères"),
        ]),
    )],
};

static PROFILE: Schema = Schema {
    name: SchemaName::Profile,
    fields: &[
        FieldSpec::required(
            "display_name",
            Text(&[MinChars(1, DISPLAY_NAME_REQUIRED), MaxChars(50, DISPLAY_NAME_TOO_LONG)]),
        ),
        FieldSpec::optional("bio", Text(&[MaxChars(300, "La bio ne peut pas dépasser 300 caractères")])),
        FieldSpec::optional("location", Text(&[MaxChars(100, "La localisation ne peut pas dépasser 100 caractères")])),
        FieldSpec::optional("profession", Text(&[MaxChars(100, "La profession ne peut pas dépasser 100 caractères")])),
        FieldSpec::optional_or_empty("phone", Text(&[Check(is_phone, "Format de téléphone invalide")])),
        FieldSpec::optional_or_empty("website", Text(&[Check(is_url, "URL invalide")])),
    ],
};

static LOGIN: Schema = Schema {
    name: SchemaName::Login,
    fields: &[
        FieldSpec::required("email", Text(&[Check(is_email, EMAIL_INVALID), MaxChars(254, EMAIL_TOO_LONG)])),
        FieldSpec::required(
            "password",
            Text(&[MinChars(6, "Le mot de passe doit contenir au moins 6 caractères")]),
        ),
    ],
};

static SIGNUP: Schema = Schema {
    name: SchemaName::Signup,
    fields: &[
        FieldSpec::required("email", Text(&[Check(is_email, EMAIL_INVALID), MaxChars(254, EMAIL_TOO_LONG)])),
        FieldSpec::required(
            "password",
            Text(&[
                MinChars(8, "Le mot de passe doit contenir au moins 8 caractères"),
                Check(has_lowercase, "Le mot de passe doit contenir au moins une minuscule"),
                Check(has_uppercase, "Le mot de passe doit contenir au moins une majuscule"),
                Check(has_digit, "Le mot de passe doit contenir au moins un chiffre"),
            ]),
        ),
        FieldSpec::required(
            "display_name",
            Text(&[MinChars(1, DISPLAY_NAME_REQUIRED), MaxChars(50, DISPLAY_NAME_TOO_LONG)]),
        ),
    ],
};

static PRIVACY_SETTINGS: Schema = Schema {
    name: SchemaName::PrivacySettings,
    fields: &[
        FieldSpec::required("profile_visibility", OneOf(&["public", "private", "friends"])),
        FieldSpec::required("activity_status", Boolean),
        FieldSpec::required("data_collection", Boolean),
        FieldSpec::required("personalized_ads", Boolean),
    ],
};

/// The closed set of input forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaName {
    Post,
    Comment,
    Profile,
    Login,
    Signup,
    PrivacySettings,
}

impl SchemaName {
    pub const ALL: [SchemaName; 6] = [
        SchemaName::Post,
        SchemaName::Comment,
        SchemaName::Profile,
        SchemaName::Login,
        SchemaName::Signup,
        SchemaName::PrivacySettings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaName::Post => "post",
            SchemaName::Comment => "comment",
            SchemaName::Profile => "profile",
            SchemaName::Login => "login",
            SchemaName::Signup => "signup",
            SchemaName::PrivacySettings => "privacy_settings",
        }
    }

    pub fn schema(self) -> &'static Schema {
        match self {
            SchemaName::Post => &POST,
            SchemaName::Comment => &COMMENT,
            SchemaName::Profile => &PROFILE,
            SchemaName::Login => &LOGIN,
            SchemaName::Signup => &SIGNUP,
            SchemaName::PrivacySettings => &PRIVACY_SETTINGS,
        }
    }

    /// Message reported when `field` ends up empty: its minimum-length
    /// message if it has one, otherwise the generic required message.
    pub fn required_message(self, field: &str) -> &'static str {
        self.schema()
            .fields
            .iter()
            .filter(|spec| spec.name == field)
            .find_map(|spec| match spec.kind {
                FieldKind::Text(rules) => rules.iter().find_map(|rule| match *rule {
                    TextRule::MinChars(_, message) => Some(message),
                    _ => None,
                }),
                _ => None,
            })
            .unwrap_or(REQUIRED)
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown validation schema `{0}`")]
pub struct UnknownSchema(pub String);

impl FromStr for SchemaName {
    type Err = UnknownSchema;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchemaName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownSchema(s.to_string()))
    }
}

/// Checks `input` against the named schema.
pub fn validate(name: SchemaName, input: &Value) -> Result<ParsedRecord, Vec<FieldError>> {
    let Some(object) = input.as_object() else {
        return Err(vec![FieldError::new("", EXPECTED_OBJECT)]);
    };

    let mut parsed = ParsedRecord::new();
    let mut errors = Vec::new();

    for field in name.schema().fields {
        match object.get(field.name).filter(|v| !v.is_null()) {
            None if field.presence == Presence::Required => {
                errors.push(FieldError::new(field.name, REQUIRED));
            }
            None => {}
            Some(value) => {
                let before = errors.len();
                field.check(value, &mut errors);
                if errors.len() == before {
                    parsed.insert(field.name.to_string(), value.clone());
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(parsed)
    } else {
        tracing::debug!(schema = %name, violations = errors.len(), "validation failed");
        Err(errors)
    }
}

/// Serializes a typed form and checks it against the named schema.
pub fn validate_serialized<T: Serialize>(name: SchemaName, input: &T) -> Result<ParsedRecord, Vec<FieldError>> {
    match serde_json::to_value(input) {
        Ok(value) => validate(name, &value),
        Err(e) => {
            tracing::warn!(schema = %name, error = %e, "form did not serialize");
            Err(vec![FieldError::new("", EXPECTED_OBJECT)])
        }
    }
}

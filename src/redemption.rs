//! Redemption form selection and validation.

use std::collections::{BTreeMap, HashMap};

use crate::error::RedemptionError;
use crate::types::{FieldKind, FormCategory, FormField, FormSpec};

const STREAMING_KEYWORDS: &[&str] = &[
    "netflix",
    "spotify",
    "disney",
    "hbo",
    "amazon prime",
    "youtube premium",
    "deezer",
    "apple music",
    "paramount",
];

const GIFT_CARD_KEYWORDS: &[&str] = &[
    "gift card",
    "voucher",
    "cartão presente",
    "playstation",
    "xbox",
    "steam",
    "google play",
    "app store",
    "itunes",
];

const MOBILE_CREDIT_KEYWORDS: &[&str] = &[
    "crédito",
    "saldo",
    "recarga",
    "m-pesa",
    "e-mola",
    "mkesh",
    "airtime",
    "dados",
    "internet",
];

const PHYSICAL_KEYWORDS: &[&str] = &[
    "fone",
    "headphone",
    "celular",
    "smartphone",
    "tablet",
    "laptop",
    "tv",
    "console",
    "roupa",
    "tênis",
    "relógio",
    "acessório",
];

/// Checked in order; the first list with a hit wins.
const PRECEDENCE: &[(FormCategory, &[&str])] = &[
    (FormCategory::Streaming, STREAMING_KEYWORDS),
    (FormCategory::GiftCard, GIFT_CARD_KEYWORDS),
    (FormCategory::MobileCredit, MOBILE_CREDIT_KEYWORDS),
    (FormCategory::Physical, PHYSICAL_KEYWORDS),
];

const STREAMING_FIELDS: &[FormField] = &[
    FormField {
        name: "email",
        label: "Email para a conta",
        kind: FieldKind::Email,
        placeholder: "seu@email.com",
    },
    FormField {
        name: "password",
        label: "Senha desejada",
        kind: FieldKind::Password,
        placeholder: "Crie uma senha segura",
    },
];

const GIFT_CARD_FIELDS: &[FormField] = &[FormField {
    name: "email",
    label: "Email para receber o código",
    kind: FieldKind::Email,
    placeholder: "seu@email.com",
}];

const MOBILE_CREDIT_FIELDS: &[FormField] = &[
    FormField {
        name: "phone",
        label: "Número de telefone",
        kind: FieldKind::Tel,
        placeholder: "+258 84 XXX XXXX",
    },
    FormField {
        name: "operator",
        label: "Operadora",
        kind: FieldKind::Text,
        placeholder: "M-Pesa, E-Mola, Mkesh...",
    },
];

const PHYSICAL_FIELDS: &[FormField] = &[
    FormField {
        name: "fullName",
        label: "Nome completo",
        kind: FieldKind::Text,
        placeholder: "Seu nome completo",
    },
    FormField {
        name: "phone",
        label: "Telefone de contato",
        kind: FieldKind::Tel,
        placeholder: "+258 84 XXX XXXX",
    },
    FormField {
        name: "province",
        label: "Província",
        kind: FieldKind::Text,
        placeholder: "Ex: Maputo",
    },
    FormField {
        name: "city",
        label: "Cidade/Distrito",
        kind: FieldKind::Text,
        placeholder: "Ex: Matola",
    },
    FormField {
        name: "address",
        label: "Endereço completo",
        kind: FieldKind::Text,
        placeholder: "Rua, número, bairro",
    },
    FormField {
        name: "reference",
        label: "Ponto de referência",
        kind: FieldKind::Text,
        placeholder: "Próximo a...",
    },
];

const GENERIC_FIELDS: &[FormField] = &[
    FormField {
        name: "email",
        label: "Email",
        kind: FieldKind::Email,
        placeholder: "seu@email.com",
    },
    FormField {
        name: "phone",
        label: "Telefone",
        kind: FieldKind::Tel,
        placeholder: "+258 84 XXX XXXX",
    },
];

pub fn classify(prize_name: &str) -> FormCategory {
    let name = prize_name.to_lowercase();
    PRECEDENCE
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| name.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(FormCategory::Generic)
}

pub fn form_fields(category: FormCategory) -> FormSpec {
    let (title, fields) = match category {
        FormCategory::Streaming => ("Dados para ativação da conta", STREAMING_FIELDS),
        FormCategory::GiftCard => ("Dados para envio do código", GIFT_CARD_FIELDS),
        FormCategory::MobileCredit => ("Dados para recarga", MOBILE_CREDIT_FIELDS),
        FormCategory::Physical => ("Dados para entrega", PHYSICAL_FIELDS),
        FormCategory::Generic => ("Dados para resgate", GENERIC_FIELDS),
    };
    FormSpec {
        category,
        title,
        fields,
    }
}

/// Keeps only the category's fields, trimmed; every one must be non-blank.
pub fn validate_form(
    category: FormCategory,
    data: &HashMap<String, String>,
) -> Result<BTreeMap<String, String>, RedemptionError> {
    let spec = form_fields(category);
    let mut accepted = BTreeMap::new();
    let mut missing = Vec::new();

    for field in spec.fields {
        match data.get(field.name).map(|v| v.trim()) {
            Some(value) if !value.is_empty() => {
                accepted.insert(field.name.to_string(), value.to_string());
            }
            _ => missing.push(field.name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(RedemptionError::MissingFields(missing));
    }
    Ok(accepted)
}

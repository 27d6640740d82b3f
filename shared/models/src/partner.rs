//! Partner entities (buyer groups) and the partners contracted under them.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::audit::AuditFields;
use crate::enrollment::MAX_TONNAGE;
use crate::forms::validate_code_chars;

pub const PARTNER_ENTITY_SORT_FIELDS: &[&str] = &["id", "name", "code", "created_at", "updated_at"];
pub const PARTNER_SORT_FIELDS: &[&str] = &["id", "name", "code", "entity_id", "created_at", "updated_at"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartnerEntity {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub is_halco_buyer: bool,
    #[serde(flatten)]
    pub audit: AuditFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct NewPartnerEntity {
    #[validate(length(min = 1, max = 100, message = "Entity name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(
        length(min = 1, max = 20, message = "Entity code must be between 1 and 20 characters"),
        custom(function = "validate_code_chars", message = "Entity code may only contain letters, digits, '.', '_' and '-'")
    )]
    pub code: String,
    #[validate(length(max = 1000, message = "Entity description must be at most 1000 characters"))]
    pub description: Option<String>,
    #[serde(default)]
    pub is_halco_buyer: bool,
}

impl PartnerEntity {
    pub fn from_new(id: i64, new: NewPartnerEntity, audit: AuditFields) -> Self {
        Self {
            id,
            name: new.name,
            code: new.code,
            description: new.description,
            is_halco_buyer: new.is_halco_buyer,
            audit,
        }
    }

    pub fn form(&self) -> NewPartnerEntity {
        NewPartnerEntity {
            name: self.name.clone(),
            code: self.code.clone(),
            description: self.description.clone(),
            is_halco_buyer: self.is_halco_buyer,
        }
    }

    pub fn apply(&mut self, form: NewPartnerEntity) {
        self.name = form.name;
        self.code = form.code;
        self.description = form.description;
        self.is_halco_buyer = form.is_halco_buyer;
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartnerEntityFilter {
    pub name: Option<String>,
    pub code: Option<String>,
    pub is_halco_buyer: Option<bool>,
    pub q: Option<String>,
}

impl PartnerEntityFilter {
    pub fn matches(&self, entity: &PartnerEntity) -> bool {
        if self.name.as_ref().is_some_and(|name| *name != entity.name) {
            return false;
        }
        if self.code.as_ref().is_some_and(|code| *code != entity.code) {
            return false;
        }
        if self.is_halco_buyer.is_some_and(|flag| flag != entity.is_halco_buyer) {
            return false;
        }
        self.q.as_deref().map_or(true, |q| {
            crate::contains_ci(&entity.name, q) || crate::contains_ci(&entity.code, q)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerEntityView {
    #[serde(flatten)]
    pub entity: PartnerEntity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partners_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partners: Option<Vec<Partner>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Partner {
    pub id: i64,
    pub entity_id: i64,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub minimum_contractual_tonnage: Option<i64>,
    #[serde(flatten)]
    pub audit: AuditFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct NewPartner {
    pub entity_id: i64,
    #[validate(length(min = 1, max = 100, message = "Partner name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(
        length(min = 1, max = 20, message = "Partner code must be between 1 and 20 characters"),
        custom(function = "validate_code_chars", message = "Partner code may only contain letters, digits, '.', '_' and '-'")
    )]
    pub code: String,
    #[validate(length(max = 1000, message = "Partner description must be at most 1000 characters"))]
    pub description: Option<String>,
    #[validate(range(min = 0, max = "MAX_TONNAGE", message = "Minimum contractual tonnage must be between 0 and 1000000000000"))]
    pub minimum_contractual_tonnage: Option<i64>,
}

impl Partner {
    pub fn from_new(id: i64, new: NewPartner, audit: AuditFields) -> Self {
        Self {
            id,
            entity_id: new.entity_id,
            name: new.name,
            code: new.code,
            description: new.description,
            minimum_contractual_tonnage: new.minimum_contractual_tonnage,
            audit,
        }
    }

    pub fn form(&self) -> NewPartner {
        NewPartner {
            entity_id: self.entity_id,
            name: self.name.clone(),
            code: self.code.clone(),
            description: self.description.clone(),
            minimum_contractual_tonnage: self.minimum_contractual_tonnage,
        }
    }

    pub fn apply(&mut self, form: NewPartner) {
        self.entity_id = form.entity_id;
        self.name = form.name;
        self.code = form.code;
        self.description = form.description;
        self.minimum_contractual_tonnage = form.minimum_contractual_tonnage;
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartnerFilter {
    pub name: Option<String>,
    pub code: Option<String>,
    pub entity_id: Option<i64>,
    pub q: Option<String>,
}

impl PartnerFilter {
    pub fn for_entity(entity_id: i64) -> Self {
        Self {
            entity_id: Some(entity_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, partner: &Partner) -> bool {
        if self.name.as_ref().is_some_and(|name| *name != partner.name) {
            return false;
        }
        if self.code.as_ref().is_some_and(|code| *code != partner.code) {
            return false;
        }
        if self.entity_id.is_some_and(|entity_id| entity_id != partner.entity_id) {
            return false;
        }
        self.q.as_deref().map_or(true, |q| {
            crate::contains_ci(&partner.name, q) || crate::contains_ci(&partner.code, q)
        })
    }
}

/// A partner joined with its entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartnerView {
    #[serde(flatten)]
    pub partner: Partner,
    pub entity_name: String,
    pub entity_code: String,
    pub is_halco_buyer: bool,
}

impl PartnerView {
    pub fn new(partner: Partner, entity: &PartnerEntity) -> Self {
        Self {
            partner,
            entity_name: entity.name.clone(),
            entity_code: entity.code.clone(),
            is_halco_buyer: entity.is_halco_buyer,
        }
    }
}

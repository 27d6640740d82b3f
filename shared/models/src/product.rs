//! Products extracted at a mine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::audit::AuditFields;
use crate::forms::validate_code_chars;
use crate::mine::Mine;

pub const PRODUCT_SORT_FIELDS: &[&str] = &["id", "name", "code", "mine_id", "created_at", "updated_at"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub mine_id: i64,
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub audit: AuditFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct NewProduct {
    pub mine_id: i64,
    #[validate(length(min = 1, max = 100, message = "Product name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(
        length(min = 1, max = 50, message = "Product code must be at most 50 characters"),
        custom(function = "validate_code_chars", message = "Product code may only contain letters, digits, '.', '_' and '-'")
    )]
    pub code: Option<String>,
    #[validate(length(max = 1000, message = "Product description must be at most 1000 characters"))]
    pub description: Option<String>,
}

/// A product nested under a mine payload, before the mine id is known.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ProductDraft {
    #[validate(length(min = 1, max = 100, message = "Product name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(
        length(min = 1, max = 50, message = "Product code must be at most 50 characters"),
        custom(function = "validate_code_chars", message = "Product code may only contain letters, digits, '.', '_' and '-'")
    )]
    pub code: Option<String>,
    #[validate(length(max = 1000, message = "Product description must be at most 1000 characters"))]
    pub description: Option<String>,
}

impl ProductDraft {
    pub fn for_mine(self, mine_id: i64) -> NewProduct {
        NewProduct {
            mine_id,
            name: self.name,
            code: self.code,
            description: self.description,
        }
    }
}

impl Product {
    pub fn from_new(id: i64, new: NewProduct, audit: AuditFields) -> Self {
        Self {
            id,
            mine_id: new.mine_id,
            name: new.name,
            code: new.code,
            description: new.description,
            audit,
        }
    }

    pub fn form(&self) -> NewProduct {
        NewProduct {
            mine_id: self.mine_id,
            name: self.name.clone(),
            code: self.code.clone(),
            description: self.description.clone(),
        }
    }

    pub fn apply(&mut self, form: NewProduct) {
        self.mine_id = form.mine_id;
        self.name = form.name;
        self.code = form.code;
        self.description = form.description;
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub name: Option<String>,
    pub code: Option<String>,
    pub mine_id: Option<i64>,
    pub q: Option<String>,
}

impl ProductFilter {
    pub fn for_mine(mine_id: i64) -> Self {
        Self {
            mine_id: Some(mine_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, product: &Product) -> bool {
        if self.name.as_ref().is_some_and(|name| *name != product.name) {
            return false;
        }
        if self.code.is_some() && self.code != product.code {
            return false;
        }
        if self.mine_id.is_some_and(|mine_id| mine_id != product.mine_id) {
            return false;
        }
        match self.q.as_deref() {
            Some(q) => {
                crate::contains_ci(&product.name, q)
                    || product.code.as_deref().is_some_and(|code| crate::contains_ci(code, q))
                    || product
                        .description
                        .as_deref()
                        .is_some_and(|description| crate::contains_ci(description, q))
            }
            None => true,
        }
    }
}

/// Short reference to the owning mine, embedded in product responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MineRef {
    pub id: i64,
    pub name: String,
    pub code: Option<String>,
    pub country: String,
}

impl From<&Mine> for MineRef {
    fn from(mine: &Mine) -> Self {
        Self {
            id: mine.id,
            name: mine.name.clone(),
            code: mine.code.clone(),
            country: mine.country.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mine: Option<MineRef>,
}

/// `POST /api/products/batch` body.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductBatchCreate {
    pub mine_id: i64,
    #[validate]
    pub products: Vec<ProductDraft>,
}

/// `PATCH /api/products/batch` body; each update carries its product `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductBatchUpdate {
    pub updates: Vec<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn new_product(name: &str) -> NewProduct {
        NewProduct {
            mine_id: 1,
            name: name.to_string(),
            code: None,
            description: None,
        }
    }

    #[test]
    fn test_name_required() {
        assert!(new_product("").validate().is_err());
        assert!(new_product("CBG").validate().is_ok());
    }

    #[test]
    fn test_code_length_and_format() {
        let mut product = new_product("CBG");
        product.code = Some("X".repeat(51));
        assert!(product.validate().is_err());

        product.code = Some("CBG 45".to_string());
        assert!(product.validate().is_err());

        product.code = Some("CBG-45".to_string());
        assert!(product.validate().is_ok());
    }

    #[test]
    fn test_filter_by_mine() {
        let product = Product::from_new(7, new_product("CBG"), AuditFields::default());
        assert!(ProductFilter::for_mine(1).matches(&product));
        assert!(!ProductFilter::for_mine(2).matches(&product));
    }
}

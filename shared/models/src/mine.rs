//! Mining sites and the port they ship from.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::audit::AuditFields;
use crate::forms::{default_one, validate_code_chars};
use crate::product::{Product, ProductDraft};

pub const MIN_LATITUDE: f64 = -90.0;
pub const MIN_LONGITUDE: f64 = -180.0;

/// Sort fields accepted by mine listings.
pub const MINE_SORT_FIELDS: &[&str] = &["id", "name", "country", "created_at", "updated_at"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mine {
    pub id: i64,
    pub name: String,
    pub code: Option<String>,
    pub country: String,
    pub port_location: String,
    pub port_latitude: f64,
    pub port_longitude: f64,
    pub port_berths: i32,
    pub shiploaders: i32,
    #[serde(flatten)]
    pub audit: AuditFields,
}

/// Editable fields of a mine; used for creation and as the base of updates.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct NewMine {
    #[validate(length(min = 1, max = 200, message = "Mine name must be between 1 and 200 characters"))]
    pub name: String,
    #[validate(
        length(min = 1, max = 50, message = "Mine code must be at most 50 characters"),
        custom(function = "validate_code_chars", message = "Mine code may only contain letters, digits, '.', '_' and '-'")
    )]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Country must be between 1 and 100 characters"))]
    pub country: String,
    #[validate(length(min = 1, max = 150, message = "Port location must be between 1 and 150 characters"))]
    pub port_location: String,
    #[validate(range(min = "MIN_LATITUDE", max = 90.0, message = "Port latitude must be between -90 and 90"))]
    pub port_latitude: f64,
    #[validate(range(min = "MIN_LONGITUDE", max = 180.0, message = "Port longitude must be between -180 and 180"))]
    pub port_longitude: f64,
    #[serde(default = "default_one")]
    #[validate(range(min = 0, message = "Port berths must be zero or more"))]
    pub port_berths: i32,
    #[serde(default = "default_one")]
    #[validate(range(min = 0, message = "Shiploaders must be zero or more"))]
    pub shiploaders: i32,
}

impl Mine {
    pub fn from_new(id: i64, new: NewMine, audit: AuditFields) -> Self {
        Self {
            id,
            name: new.name,
            code: new.code,
            country: new.country,
            port_location: new.port_location,
            port_latitude: new.port_latitude,
            port_longitude: new.port_longitude,
            port_berths: new.port_berths,
            shiploaders: new.shiploaders,
            audit,
        }
    }

    pub fn form(&self) -> NewMine {
        NewMine {
            name: self.name.clone(),
            code: self.code.clone(),
            country: self.country.clone(),
            port_location: self.port_location.clone(),
            port_latitude: self.port_latitude,
            port_longitude: self.port_longitude,
            port_berths: self.port_berths,
            shiploaders: self.shiploaders,
        }
    }

    pub fn apply(&mut self, form: NewMine) {
        self.name = form.name;
        self.code = form.code;
        self.country = form.country;
        self.port_location = form.port_location;
        self.port_latitude = form.port_latitude;
        self.port_longitude = form.port_longitude;
        self.port_berths = form.port_berths;
        self.shiploaders = form.shiploaders;
    }

    /// The code when one is set, otherwise the name.
    pub fn main_identifier(&self) -> &str {
        self.code.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MineFilter {
    pub name: Option<String>,
    pub code: Option<String>,
    pub country: Option<String>,
    pub q: Option<String>,
}

impl MineFilter {
    pub fn matches(&self, mine: &Mine) -> bool {
        if self.name.as_ref().is_some_and(|name| *name != mine.name) {
            return false;
        }
        if self.code.is_some() && self.code != mine.code {
            return false;
        }
        if self.country.as_ref().is_some_and(|country| *country != mine.country) {
            return false;
        }
        match self.q.as_deref() {
            Some(q) => {
                crate::contains_ci(&mine.name, q)
                    || crate::contains_ci(&mine.country, q)
                    || mine.code.as_deref().is_some_and(|code| crate::contains_ci(code, q))
            }
            None => true,
        }
    }
}

/// A mine as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineView {
    #[serde(flatten)]
    pub mine: Mine,
    pub main_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<Product>>,
}

impl MineView {
    pub fn with_count(mine: Mine, products_count: i64) -> Self {
        Self {
            main_identifier: mine.main_identifier().to_string(),
            mine,
            products_count: Some(products_count),
            products: None,
        }
    }

    pub fn with_products(mine: Mine, products: Vec<Product>) -> Self {
        Self {
            main_identifier: mine.main_identifier().to_string(),
            products_count: Some(products.len() as i64),
            mine,
            products: Some(products),
        }
    }
}

/// `POST /api/mines` body: the mine plus optional products.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMineRequest {
    #[serde(flatten)]
    #[validate]
    pub mine: NewMine,
    #[serde(default)]
    #[validate]
    pub products: Vec<ProductDraft>,
}

/// `POST /api/mines/with-products` body.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MineWithProductsRequest {
    #[validate]
    pub mine: NewMine,
    #[validate]
    pub products: Vec<ProductDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryCount {
    pub country: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    pub(crate) fn sample_new_mine() -> NewMine {
        NewMine {
            name: "Sangaredi".to_string(),
            code: Some("SNG".to_string()),
            country: "Guinea".to_string(),
            port_location: "Kamsar".to_string(),
            port_latitude: 10.65,
            port_longitude: -14.61,
            port_berths: 2,
            shiploaders: 1,
        }
    }

    #[test]
    fn test_valid_mine() {
        assert!(sample_new_mine().validate().is_ok());
    }

    #[test]
    fn test_coordinates_bounds() {
        let mut mine = sample_new_mine();
        mine.port_latitude = -91.0;
        assert!(mine.validate().is_err());

        let mut mine = sample_new_mine();
        mine.port_longitude = 180.5;
        assert!(mine.validate().is_err());

        let mut mine = sample_new_mine();
        mine.port_latitude = -90.0;
        mine.port_longitude = -180.0;
        assert!(mine.validate().is_ok());
    }

    #[test]
    fn test_negative_berths_rejected() {
        let mut mine = sample_new_mine();
        mine.port_berths = -1;
        assert!(mine.validate().is_err());
    }

    #[test]
    fn test_defaults_when_counts_missing() {
        let mine: NewMine = serde_json::from_value(serde_json::json!({
            "name": "Boke",
            "code": null,
            "country": "Guinea",
            "port_location": "Kamsar",
            "port_latitude": 10.6,
            "port_longitude": -14.6
        }))
        .unwrap();
        assert_eq!(mine.port_berths, 1);
        assert_eq!(mine.shiploaders, 1);
    }

    #[test]
    fn test_main_identifier_prefers_code() {
        let mut mine = Mine::from_new(1, sample_new_mine(), AuditFields::default());
        assert_eq!(mine.main_identifier(), "SNG");
        mine.code = None;
        assert_eq!(mine.main_identifier(), "Sangaredi");
    }

    #[test]
    fn test_filter_query_is_case_insensitive() {
        let mine = Mine::from_new(1, sample_new_mine(), AuditFields::default());
        let filter = MineFilter {
            q: Some("guin".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&mine));

        let filter = MineFilter {
            country: Some("Ghana".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&mine));
    }
}

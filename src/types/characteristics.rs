//! Sustainability characteristics and the field vocabulary used by diffs.
//!
//! Characteristics are authored on the first lot of a chain and copied to
//! every lot or stock split or forwarded from it. Corrections upstream are
//! re-applied downstream by the propagation engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::quantity::{round2, Biofuel};

/// Greenhouse gas emission components, in gCO2eq/MJ.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GhgComponents {
    /// Extraction or cultivation.
    pub eec: f64,
    /// Land use change.
    pub el: f64,
    /// Processing.
    pub ep: f64,
    /// Transport and distribution.
    pub etd: f64,
    /// Fuel in use.
    pub eu: f64,
    /// Soil carbon accumulation.
    pub esca: f64,
    /// Carbon capture and geological storage.
    pub eccs: f64,
    /// Carbon capture and replacement.
    pub eccr: f64,
}

impl GhgComponents {
    /// Total emissions: emitting terms minus savings terms.
    pub fn total(&self) -> f64 {
        round2(self.eec + self.el + self.ep + self.etd + self.eu - self.esca - self.eccs - self.eccr)
    }
}

/// Inheritable characteristics shared by lots and stocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Characteristics {
    /// Feedstock code.
    pub feedstock: String,
    /// Commodity.
    pub biofuel: Biofuel,
    /// Country of origin of the feedstock.
    pub country_of_origin: Option<String>,
    /// Production site name.
    pub production_site: Option<String>,
    /// Certificate of the production site.
    pub production_site_certificate: Option<String>,
    /// Certificate of the supplier.
    pub supplier_certificate: Option<String>,
    /// Emission components.
    pub ghg: GhgComponents,
}

impl Characteristics {
    /// Create characteristics with only commodity identity set.
    pub fn new(feedstock: impl Into<String>, biofuel: Biofuel) -> Self {
        Self {
            feedstock: feedstock.into(),
            biofuel,
            country_of_origin: None,
            production_site: None,
            production_site_certificate: None,
            supplier_certificate: None,
            ghg: GhgComponents::default(),
        }
    }

    /// Current value of an inheritable field; `None` for non-inheritable fields.
    pub fn get(&self, field: Field) -> Option<FieldValue> {
        let value = match field {
            Field::Feedstock => FieldValue::Feedstock(self.feedstock.clone()),
            Field::Biofuel => FieldValue::Biofuel(self.biofuel.clone()),
            Field::CountryOfOrigin => FieldValue::CountryOfOrigin(self.country_of_origin.clone()),
            Field::ProductionSite => FieldValue::ProductionSite(self.production_site.clone()),
            Field::ProductionSiteCertificate => {
                FieldValue::ProductionSiteCertificate(self.production_site_certificate.clone())
            }
            Field::SupplierCertificate => {
                FieldValue::SupplierCertificate(self.supplier_certificate.clone())
            }
            Field::Ghg => FieldValue::Ghg(self.ghg),
            Field::Volume | Field::TransportDocumentReference | Field::DeliverySite => return None,
        };
        Some(value)
    }

    /// Write an inheritable value. Returns false if the field is not a characteristic.
    pub(crate) fn set(&mut self, value: &FieldValue) -> bool {
        match value {
            FieldValue::Feedstock(v) => self.feedstock = v.clone(),
            FieldValue::Biofuel(v) => self.biofuel = v.clone(),
            FieldValue::CountryOfOrigin(v) => self.country_of_origin = v.clone(),
            FieldValue::ProductionSite(v) => self.production_site = v.clone(),
            FieldValue::ProductionSiteCertificate(v) => self.production_site_certificate = v.clone(),
            FieldValue::SupplierCertificate(v) => self.supplier_certificate = v.clone(),
            FieldValue::Ghg(v) => self.ghg = *v,
            FieldValue::Volume(_)
            | FieldValue::TransportDocumentReference(_)
            | FieldValue::DeliverySite(_) => return false,
        }
        true
    }
}

/// Mutable field of a ledger node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Lot volume.
    Volume,
    /// Feedstock.
    Feedstock,
    /// Commodity.
    Biofuel,
    /// Country of origin.
    CountryOfOrigin,
    /// Production site.
    ProductionSite,
    /// Production site certificate.
    ProductionSiteCertificate,
    /// Supplier certificate.
    SupplierCertificate,
    /// Emission components.
    Ghg,
    /// Transport document reference (local to a lot).
    TransportDocumentReference,
    /// Delivery site (local to a lot).
    DeliverySite,
}

impl Field {
    /// Whether downstream nodes copy this field from their parent.
    pub fn is_inheritable(&self) -> bool {
        !matches!(self, Self::Volume | Self::TransportDocumentReference | Self::DeliverySite)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Volume => "volume",
            Self::Feedstock => "feedstock",
            Self::Biofuel => "biofuel",
            Self::CountryOfOrigin => "country_of_origin",
            Self::ProductionSite => "production_site",
            Self::ProductionSiteCertificate => "production_site_certificate",
            Self::SupplierCertificate => "supplier_certificate",
            Self::Ghg => "ghg",
            Self::TransportDocumentReference => "transport_document_reference",
            Self::DeliverySite => "delivery_site",
        };
        write!(f, "{}", name)
    }
}

/// A field together with a value for it.
///
/// Used both as a requested change and as either side of a diff entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Lot volume.
    Volume(f64),
    /// Feedstock.
    Feedstock(String),
    /// Commodity.
    Biofuel(Biofuel),
    /// Country of origin.
    CountryOfOrigin(Option<String>),
    /// Production site.
    ProductionSite(Option<String>),
    /// Production site certificate.
    ProductionSiteCertificate(Option<String>),
    /// Supplier certificate.
    SupplierCertificate(Option<String>),
    /// Emission components.
    Ghg(GhgComponents),
    /// Transport document reference.
    TransportDocumentReference(Option<String>),
    /// Delivery site.
    DeliverySite(Option<String>),
}

impl FieldValue {
    /// The field this value belongs to.
    pub fn field(&self) -> Field {
        match self {
            Self::Volume(_) => Field::Volume,
            Self::Feedstock(_) => Field::Feedstock,
            Self::Biofuel(_) => Field::Biofuel,
            Self::CountryOfOrigin(_) => Field::CountryOfOrigin,
            Self::ProductionSite(_) => Field::ProductionSite,
            Self::ProductionSiteCertificate(_) => Field::ProductionSiteCertificate,
            Self::SupplierCertificate(_) => Field::SupplierCertificate,
            Self::Ghg(_) => Field::Ghg,
            Self::TransportDocumentReference(_) => Field::TransportDocumentReference,
            Self::DeliverySite(_) => Field::DeliverySite,
        }
    }
}

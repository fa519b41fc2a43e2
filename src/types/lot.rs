//! Lot: a quantity of commodity in transit between two parties, or in draft.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::characteristics::{Characteristics, Field, FieldValue};
use super::ids::{EntityId, LotId, StockId};
use super::quantity::Quantity;

/// Lifecycle status of a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    /// Being authored, not yet visible to the counterpart.
    Draft,
    /// Sent, awaiting the counterpart's decision.
    Pending,
    /// Accepted by the counterpart.
    Accepted,
    /// Refused by the counterpart.
    Rejected,
    /// Declared by both parties; immutable.
    Frozen,
    /// Removed; immutable.
    Deleted,
}

impl LotStatus {
    /// Terminal statuses admit no further mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Frozen | Self::Deleted)
    }
}

impl fmt::Display for LotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::Pending => write!(f, "PENDING"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Frozen => write!(f, "FROZEN"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

/// Correction workflow status of a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectionStatus {
    /// No correction requested.
    #[default]
    NoIssue,
    /// A correction is open; the author may edit.
    InCorrection,
    /// The author marked the correction done; awaiting approval.
    Fixed,
}

impl fmt::Display for CorrectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoIssue => write!(f, "NO_ISSUE"),
            Self::InCorrection => write!(f, "IN_CORRECTION"),
            Self::Fixed => write!(f, "FIXED"),
        }
    }
}

/// Non-fatal flag attached to a lot by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotWarning {
    /// A volume increase exceeded the parent stock's remaining volume and was reverted.
    NotEnoughVolumeLeft {
        /// Requested volume.
        requested: f64,
        /// Volume kept on the lot.
        kept: f64,
        /// Remaining volume of the parent stock at check time.
        available: f64,
    },
}

impl LotWarning {
    /// Code of [`LotWarning::NotEnoughVolumeLeft`].
    pub const NOT_ENOUGH_VOLUME_LEFT: &'static str = "NOT_ENOUGH_VOLUME_LEFT";

    /// Stable warning code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotEnoughVolumeLeft { .. } => Self::NOT_ENOUGH_VOLUME_LEFT,
        }
    }
}

/// A lot.
///
/// Lots are value objects: fields are only written by the engines of this
/// crate so that every change is diff-tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub(crate) id: LotId,
    pub(crate) author: EntityId,
    pub(crate) client: Option<EntityId>,
    pub(crate) status: LotStatus,
    pub(crate) correction_status: CorrectionStatus,
    pub(crate) quantity: Quantity,
    pub(crate) characteristics: Characteristics,
    pub(crate) parent_lot: Option<LotId>,
    pub(crate) parent_stock: Option<StockId>,
    pub(crate) transport_document_reference: Option<String>,
    pub(crate) delivery_site: Option<String>,
    pub(crate) declared_by_supplier: bool,
    pub(crate) declared_by_client: bool,
    #[serde(default)]
    pub(crate) warnings: Vec<LotWarning>,
    pub(crate) created_at: DateTime<Utc>,
}

impl Lot {
    /// Create a draft lot with a fresh id.
    pub fn draft(author: EntityId, characteristics: Characteristics, volume: f64) -> Self {
        let quantity = characteristics.biofuel.quantity(volume);
        Self {
            id: LotId::generate(),
            author,
            client: None,
            status: LotStatus::Draft,
            correction_status: CorrectionStatus::NoIssue,
            quantity,
            characteristics,
            parent_lot: None,
            parent_stock: None,
            transport_document_reference: None,
            delivery_site: None,
            declared_by_supplier: false,
            declared_by_client: false,
            warnings: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Use a specific id.
    pub fn with_id(mut self, id: LotId) -> Self {
        self.id = id;
        self
    }

    /// Set the counterpart.
    pub fn with_client(mut self, client: EntityId) -> Self {
        self.client = Some(client);
        self
    }

    /// Mark as forwarded from another lot.
    pub fn with_parent_lot(mut self, parent: LotId) -> Self {
        self.parent_lot = Some(parent);
        self
    }

    /// Mark as drawn from a stock.
    pub fn with_parent_stock(mut self, parent: StockId) -> Self {
        self.parent_stock = Some(parent);
        self
    }

    /// Set the status of a record imported from an existing ledger.
    pub fn with_status(mut self, status: LotStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the declaration flags of a record imported from an existing ledger.
    pub fn with_declarations(mut self, by_supplier: bool, by_client: bool) -> Self {
        self.declared_by_supplier = by_supplier;
        self.declared_by_client = by_client;
        self
    }

    /// Id.
    pub fn id(&self) -> LotId {
        self.id
    }

    /// Author entity.
    pub fn author(&self) -> EntityId {
        self.author
    }

    /// Counterpart entity, if any.
    pub fn client(&self) -> Option<EntityId> {
        self.client
    }

    /// Lifecycle status.
    pub fn status(&self) -> LotStatus {
        self.status
    }

    /// Correction status.
    pub fn correction_status(&self) -> CorrectionStatus {
        self.correction_status
    }

    /// Volume in litres.
    pub fn volume(&self) -> f64 {
        self.quantity.volume
    }

    /// Volume, weight and energy.
    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Characteristics.
    pub fn characteristics(&self) -> &Characteristics {
        &self.characteristics
    }

    /// Lot this one was forwarded from.
    pub fn parent_lot(&self) -> Option<LotId> {
        self.parent_lot
    }

    /// Stock this one was drawn from.
    pub fn parent_stock(&self) -> Option<StockId> {
        self.parent_stock
    }

    /// Transport document reference.
    pub fn transport_document_reference(&self) -> Option<&str> {
        self.transport_document_reference.as_deref()
    }

    /// Delivery site.
    pub fn delivery_site(&self) -> Option<&str> {
        self.delivery_site.as_deref()
    }

    /// Declared by the author.
    pub fn declared_by_supplier(&self) -> bool {
        self.declared_by_supplier
    }

    /// Declared by the counterpart.
    pub fn declared_by_client(&self) -> bool {
        self.declared_by_client
    }

    /// Attached warnings.
    pub fn warnings(&self) -> &[LotWarning] {
        &self.warnings
    }

    /// Whether a warning with this code is attached.
    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|w| w.code() == code)
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Not deleted.
    pub fn is_live(&self) -> bool {
        self.status != LotStatus::Deleted
    }

    /// Current value of a field.
    pub fn field_value(&self, field: Field) -> FieldValue {
        match field {
            Field::Volume => FieldValue::Volume(self.quantity.volume),
            Field::TransportDocumentReference => {
                FieldValue::TransportDocumentReference(self.transport_document_reference.clone())
            }
            Field::DeliverySite => FieldValue::DeliverySite(self.delivery_site.clone()),
            Field::Feedstock => FieldValue::Feedstock(self.characteristics.feedstock.clone()),
            Field::Biofuel => FieldValue::Biofuel(self.characteristics.biofuel.clone()),
            Field::CountryOfOrigin => {
                FieldValue::CountryOfOrigin(self.characteristics.country_of_origin.clone())
            }
            Field::ProductionSite => {
                FieldValue::ProductionSite(self.characteristics.production_site.clone())
            }
            Field::ProductionSiteCertificate => FieldValue::ProductionSiteCertificate(
                self.characteristics.production_site_certificate.clone(),
            ),
            Field::SupplierCertificate => {
                FieldValue::SupplierCertificate(self.characteristics.supplier_certificate.clone())
            }
            Field::Ghg => FieldValue::Ghg(self.characteristics.ghg),
        }
    }

    pub(crate) fn set_volume(&mut self, volume: f64) {
        self.quantity = self.characteristics.biofuel.quantity(volume);
    }

    pub(crate) fn apply(&mut self, value: &FieldValue) {
        match value {
            FieldValue::Volume(v) => self.set_volume(*v),
            FieldValue::TransportDocumentReference(v) => {
                self.transport_document_reference = v.clone()
            }
            FieldValue::DeliverySite(v) => self.delivery_site = v.clone(),
            other => {
                self.characteristics.set(other);
                if matches!(other, FieldValue::Biofuel(_)) {
                    self.set_volume(self.quantity.volume);
                }
            }
        }
    }

    /// Attach `warning`, replacing any warning with the same code.
    pub(crate) fn attach_warning(&mut self, warning: LotWarning) {
        self.clear_warning(warning.code());
        self.warnings.push(warning);
    }

    pub(crate) fn clear_warning(&mut self, code: &str) {
        self.warnings.retain(|w| w.code() != code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::quantity::Biofuel;

    fn lot() -> Lot {
        Lot::draft(
            EntityId::generate(),
            Characteristics::new("COLZA", Biofuel::emhv()),
            1000.0,
        )
    }

    #[test]
    fn test_draft_defaults() {
        let lot = lot();
        assert_eq!(lot.status(), LotStatus::Draft);
        assert_eq!(lot.correction_status(), CorrectionStatus::NoIssue);
        assert_eq!(lot.quantity().weight, 883.0);
        assert!(lot.is_live());
    }

    #[test]
    fn test_biofuel_change_recomputes_quantity() {
        let mut lot = lot();
        lot.apply(&FieldValue::Biofuel(Biofuel::ethanol()));
        assert_eq!(lot.volume(), 1000.0);
        assert_eq!(lot.quantity().weight, 794.0);
    }

    #[test]
    fn test_field_value_roundtrip() {
        let mut lot = lot();
        let value = FieldValue::DeliverySite(Some("DEPOT-7".to_string()));
        lot.apply(&value);
        assert_eq!(lot.field_value(Field::DeliverySite), value);
        assert_eq!(lot.field_value(Field::Volume), FieldValue::Volume(1000.0));
    }

    #[test]
    fn test_field_value_reads_characteristics() {
        let mut lot = lot();
        lot.apply(&FieldValue::SupplierCertificate(Some("ISCC-42".to_string())));
        assert_eq!(
            lot.field_value(Field::SupplierCertificate),
            FieldValue::SupplierCertificate(Some("ISCC-42".to_string()))
        );
        assert_eq!(lot.field_value(Field::Feedstock), FieldValue::Feedstock("COLZA".to_string()));
        assert_eq!(lot.field_value(Field::Biofuel), FieldValue::Biofuel(Biofuel::emhv()));
    }

    #[test]
    fn test_warning_replaced_not_stacked() {
        let mut lot = lot();
        lot.attach_warning(LotWarning::NotEnoughVolumeLeft { requested: 10.0, kept: 5.0, available: 1.0 });
        lot.attach_warning(LotWarning::NotEnoughVolumeLeft { requested: 20.0, kept: 5.0, available: 1.0 });
        assert_eq!(lot.warnings().len(), 1);
        assert_eq!(
            lot.warnings()[0],
            LotWarning::NotEnoughVolumeLeft { requested: 20.0, kept: 5.0, available: 1.0 }
        );

        lot.clear_warning("NOT_ENOUGH_VOLUME_LEFT");
        assert!(lot.warnings().is_empty());
    }

    #[test]
    fn test_warning_code() {
        let w = LotWarning::NotEnoughVolumeLeft { requested: 10.0, kept: 5.0, available: 1.0 };
        assert_eq!(w.code(), "NOT_ENOUGH_VOLUME_LEFT");
    }
}

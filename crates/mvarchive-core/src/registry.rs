//! Canonical registry of project-dependent tables.
//!
//! The copy order below is the single source of truth. Parents come before
//! children, so copying forward and deleting in reverse never violates a
//! foreign key. The deletion order is always derived from it by reversal and
//! is never listed separately.

use serde::Serialize;

/// Table holding the project root records.
pub const PROJECTS_TABLE: &str = "Projects";

/// Column on `Projects` carrying the project key.
pub const PROJECT_KEY_COLUMN: &str = "LinkID";

/// Column on every dependent table referencing the project key.
pub const LINK_COLUMN: &str = "LinkIDProject";

/// A project-dependent table and its membership flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableSpec {
    pub name: &'static str,
    /// Rows are joined to a project through [`LINK_COLUMN`].
    pub project_dependent: bool,
    /// Table stores drawings, files or images.
    pub binary_payload: bool,
}

const fn rows(name: &'static str) -> TableSpec {
    TableSpec {
        name,
        project_dependent: true,
        binary_payload: false,
    }
}

const fn blobs(name: &'static str) -> TableSpec {
    TableSpec {
        name,
        project_dependent: true,
        binary_payload: true,
    }
}

/// Project-dependent tables in copy order.
pub const PROJECT_TABLES: &[TableSpec] = &[
    rows("Locations"),
    rows("Products"),
    rows("Subassemblies"),
    rows("Parts"),
    rows("Hardware"),
    rows("Edgebanding"),
    blobs("AutoCADDrawings"),
    blobs("CutPartsFiles"),
    blobs("EdgebandFiles"),
    blobs("HardwareFiles"),
    blobs("DoorWizardFiles"),
    blobs("GlobalFiles"),
    rows("Factory"),
    rows("Bundles"),
    rows("BundleItems"),
    rows("WorkOrders"),
    rows("Activities"),
    rows("BluePrintViews"),
    blobs("FaceFrameImages"),
    rows("FaceFrameImagesParts"),
    rows("FaceFrameImagesSubassemblies"),
    rows("Prompts"),
    rows("PromptMap"),
    rows("PurchaseOrders"),
    rows("Estimates"),
    rows("Correspondence"),
    rows("EventLogs"),
    blobs("Attachment"),
];

/// Look up a registered table by name.
pub fn table_spec(name: &str) -> Option<&'static TableSpec> {
    PROJECT_TABLES.iter().find(|t| t.name == name)
}

/// Source cleanup order: dependent tables in reverse copy order, then the
/// project root table last.
pub fn deletion_order() -> Vec<&'static str> {
    PROJECT_TABLES
        .iter()
        .rev()
        .map(|t| t.name)
        .chain(std::iter::once(PROJECTS_TABLE))
        .collect()
}

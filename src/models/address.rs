use serde::{Deserialize, Serialize};

/// Address components resolved from a postal code.
///
/// Never stored on its own; it only exists long enough to be merged
/// into the live record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResult {
    pub postal_code: String,
    pub street: String,
    pub neighborhood: String,
    pub city: String,
    pub region: String,
}

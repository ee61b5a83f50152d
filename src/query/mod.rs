//! Cache keys and wire parameters derived from explorer state.

pub mod key;
pub mod params;

pub use key::{build_key, QueryKey, QueryRole, SlotId};
pub use params::{encode, encode_filters, month_number, translate, QueryParams, MONTHS};

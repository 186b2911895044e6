//! Quote requests sent to vendors and the structured responses they produce.

pub mod model;

pub use model::{
    GoldenExample, PriceItem, Provenance, QuoteRequest, QuoteResponse, RequestStatus,
    RequesterContact, ResponseStatus, Vendor, VendorOrigin, normalize_email,
};

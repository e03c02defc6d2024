//! Identifier generation.
//!
//! Public identifiers are opaque strings minted at insertion time. They carry a short prefix so that an id seen in a
//! log line or a support ticket is self-describing.
use rand::RngCore;

use crate::db_types::{ApplicationId, OfferId};

pub fn new_application_id() -> ApplicationId {
    ApplicationId(format!("app-{}", random_suffix()))
}

pub fn new_offer_id() -> OfferId {
    OfferId(format!("off-{}", random_suffix()))
}

fn random_suffix() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = new_application_id();
        let b = new_application_id();
        assert!(a.as_str().starts_with("app-"));
        assert_eq!(a.as_str().len(), 20);
        assert_ne!(a, b);
        assert!(new_offer_id().as_str().starts_with("off-"));
    }
}

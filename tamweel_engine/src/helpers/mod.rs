mod ids;

pub use ids::{new_application_id, new_offer_id};

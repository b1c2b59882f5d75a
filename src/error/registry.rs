use alloy_primitives::Address;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no curve deployed for creator {creator} token {token}")]
    NotFound { creator: Address, token: Address },

    #[error("reservation {reservation_id} does not hold the deployment for creator {creator} token {token}")]
    StaleReservation {
        creator: Address,
        token: Address,
        reservation_id: String,
    },

    #[error("no curve state for token {0}")]
    UnknownToken(Address),
}

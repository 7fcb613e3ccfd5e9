pub use super::mac_address::Entity as MacAddress;
pub use super::mac_movement::Entity as MacMovement;

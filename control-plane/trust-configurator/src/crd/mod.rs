pub mod openid_connect;
pub mod shoot;

pub use openid_connect::{OpenIDConnect, OpenIDConnectSpec};
pub use shoot::{Shoot, ShootAdvertisedAddress, ShootSpec, ShootStatus};

pub mod bitmap;
pub mod run;
pub mod vlan;

//! Composite-resource assemblers
//!
//! Multi-step builders shared by the synchronizers and the event handlers.
//! Every builder reads before it writes, so re-running one after a partial
//! failure picks up where the last run stopped.

pub mod gateway;
pub mod ipam;
pub mod port_group;

pub use gateway::{
    add_router_interface, create_logical_router, delete_logical_router, remove_router_interface,
    select_gateway_routers,
};
pub use ipam::{DEFAULT_IPAM_NAME, attach_subnet, detach_subnet, ensure_default_ipam, subnet_entry};
pub use port_group::{
    attach_interface, detach_interface, ensure_interface, ensure_port_group, remove_interface,
    remove_port_group_if_unused,
};

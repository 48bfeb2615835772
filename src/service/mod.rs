//! Paid services members offer each other.

mod core;
mod endpoints;

pub use core::{
    ACTIVE, NewService, Service, ServiceUpdate, create_service, create_service_table,
    delete_service, get_service, list_services, purchase_service, update_service,
};
pub use endpoints::{
    ServiceState, create_service_endpoint, delete_service_endpoint, get_service_endpoint,
    list_services_endpoint, purchase_service_endpoint, update_service_endpoint,
};

//! Built-in resource catalogue.

mod device;
mod network;
mod objects;
mod policies;
mod vpn;

use crate::location::ScopeArm;

use super::ResourceSchema;

const OBJECT_SCOPES: &[ScopeArm] = &[ScopeArm::Shared, ScopeArm::Vsys, ScopeArm::DeviceGroup];
const NETWORK_SCOPES: &[ScopeArm] = &[ScopeArm::System, ScopeArm::Template];
const POLICY_SCOPES: &[ScopeArm] = &[ScopeArm::Vsys, ScopeArm::DeviceGroup];

/// Every built-in resource type.
pub fn all() -> Vec<ResourceSchema> {
    vec![
        objects::address(),
        objects::address_group(),
        objects::service(),
        objects::addresses(),
        network::ethernet_interface(),
        network::zone(),
        network::virtual_router(),
        network::dhcp(),
        vpn::ike_crypto_profile(),
        vpn::ipsec_tunnel(),
        policies::security_policy(),
        policies::nat_policy(),
        policies::application_override_policy(),
        device::dns_settings(),
        device::ntp_settings(),
        device::general_settings(),
        device::log_settings(),
    ]
}

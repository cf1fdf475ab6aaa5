//! Section handlers - fetch-and-normalize functions, one per [`SectionKind`].
//!
//! This module provides the normalization contract for every section:
//! - **Records**: typed, serde-serializable views of the remote payload
//!   ([`SectionRecord`] is the per-kind union)
//! - **Dispatch**: [`fetch_section`] maps a kind to its handler
//! - **Composition**: handlers that need several remote calls own them
//!   completely; a partial composition is an error, never a record
//!
//! Records keep the remote API's field names, so a cached record decodes
//! with the same derive it was fetched with.

pub mod gateways;
pub mod network;

use crate::fetch::{CallContext, FetchError};
use crate::registry::SectionKind;
use crate::traits::ApiRequest;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use gateways::{
    BgpPeer, BgpStatusSummary, CustomerGateway, ElasticIp, ElasticIpsRecord, InternetGateway,
    NatGateway, NatGatewayAddress, PeeringConnection, PeeringRole, TransitGatewayAttachment,
    VirtualInterface, VpcEndpoint, VpnConnection, VpnGateway,
};
pub use network::{
    DhcpOptionsRecord, FlowLog, IpPermission, NetworkAcl, NetworkInterface, PropagatingVgw,
    Route, RouteTable, RouteTargetType, SecurityGroup, Subnet, VpcAttributesRecord, VpcRecord,
};

// ============================================================================
// Shared record pieces
// ============================================================================

/// Key/value tag. Accepts both the EC2 (`Key`) and Direct Connect (`key`)
/// spellings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "Key", alias = "key")]
    pub key: String,
    #[serde(rename = "Value", alias = "value", default)]
    pub value: String,
}

/// Value of the tag named `key`, if present.
pub fn tag_value(tags: &[Tag], key: &str) -> Option<String> {
    tags.iter()
        .find(|tag| tag.key == key)
        .map(|tag| tag.value.clone())
}

/// Resources that carry tags and a resolved `Name`.
pub(crate) trait Tagged {
    fn tags(&self) -> &[Tag];
    fn set_name(&mut self, name: Option<String>);

    fn resolve_name(&mut self) {
        let name = tag_value(self.tags(), "Name");
        self.set_name(name);
    }
}

macro_rules! impl_tagged {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::sections::Tagged for $ty {
                fn tags(&self) -> &[$crate::sections::Tag] {
                    &self.tags
                }

                fn set_name(&mut self, name: Option<String>) {
                    self.name = name;
                }
            }
        )*
    };
}
pub(crate) use impl_tagged;

/// A counted list of resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceList<T> {
    pub total_count: usize,
    pub items: Vec<T>,
}

impl<T> ResourceList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            total_count: items.len(),
            items,
        }
    }
}

// ============================================================================
// Section record union
// ============================================================================

/// Normalized payload of one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionRecord {
    Vpc(VpcRecord),
    VpcAttributes(VpcAttributesRecord),
    Subnets(ResourceList<Subnet>),
    RouteTables(ResourceList<RouteTable>),
    InternetGateways(ResourceList<InternetGateway>),
    NatGateways(ResourceList<NatGateway>),
    ElasticIps(ElasticIpsRecord),
    SecurityGroups(ResourceList<SecurityGroup>),
    NetworkAcls(ResourceList<NetworkAcl>),
    VpcEndpoints(ResourceList<VpcEndpoint>),
    VpcPeering(ResourceList<PeeringConnection>),
    TransitGatewayAttachments(ResourceList<TransitGatewayAttachment>),
    VpnConnections(ResourceList<VpnConnection>),
    CustomerGateways(ResourceList<CustomerGateway>),
    VpnGateways(ResourceList<VpnGateway>),
    DhcpOptions(DhcpOptionsRecord),
    FlowLogs(ResourceList<FlowLog>),
    NetworkInterfaces(ResourceList<NetworkInterface>),
    DirectConnectVifs(ResourceList<VirtualInterface>),
}

impl SectionRecord {
    pub fn kind(&self) -> SectionKind {
        match self {
            SectionRecord::Vpc(_) => SectionKind::Vpc,
            SectionRecord::VpcAttributes(_) => SectionKind::VpcAttributes,
            SectionRecord::Subnets(_) => SectionKind::Subnets,
            SectionRecord::RouteTables(_) => SectionKind::RouteTables,
            SectionRecord::InternetGateways(_) => SectionKind::InternetGateways,
            SectionRecord::NatGateways(_) => SectionKind::NatGateways,
            SectionRecord::ElasticIps(_) => SectionKind::ElasticIps,
            SectionRecord::SecurityGroups(_) => SectionKind::SecurityGroups,
            SectionRecord::NetworkAcls(_) => SectionKind::NetworkAcls,
            SectionRecord::VpcEndpoints(_) => SectionKind::VpcEndpoints,
            SectionRecord::VpcPeering(_) => SectionKind::VpcPeering,
            SectionRecord::TransitGatewayAttachments(_) => SectionKind::TransitGatewayAttachments,
            SectionRecord::VpnConnections(_) => SectionKind::VpnConnections,
            SectionRecord::CustomerGateways(_) => SectionKind::CustomerGateways,
            SectionRecord::VpnGateways(_) => SectionKind::VpnGateways,
            SectionRecord::DhcpOptions(_) => SectionKind::DhcpOptions,
            SectionRecord::FlowLogs(_) => SectionKind::FlowLogs,
            SectionRecord::NetworkInterfaces(_) => SectionKind::NetworkInterfaces,
            SectionRecord::DirectConnectVifs(_) => SectionKind::DirectConnectVifs,
        }
    }

    /// Number of resources in the record (1 for single-object sections).
    pub fn item_count(&self) -> usize {
        match self {
            SectionRecord::Vpc(_) | SectionRecord::VpcAttributes(_) => 1,
            SectionRecord::DhcpOptions(record) => usize::from(record.dhcp_options_id.is_some()),
            SectionRecord::ElasticIps(record) => record.total_count,
            SectionRecord::Subnets(list) => list.total_count,
            SectionRecord::RouteTables(list) => list.total_count,
            SectionRecord::InternetGateways(list) => list.total_count,
            SectionRecord::NatGateways(list) => list.total_count,
            SectionRecord::SecurityGroups(list) => list.total_count,
            SectionRecord::NetworkAcls(list) => list.total_count,
            SectionRecord::VpcEndpoints(list) => list.total_count,
            SectionRecord::VpcPeering(list) => list.total_count,
            SectionRecord::TransitGatewayAttachments(list) => list.total_count,
            SectionRecord::VpnConnections(list) => list.total_count,
            SectionRecord::CustomerGateways(list) => list.total_count,
            SectionRecord::VpnGateways(list) => list.total_count,
            SectionRecord::FlowLogs(list) => list.total_count,
            SectionRecord::NetworkInterfaces(list) => list.total_count,
            SectionRecord::DirectConnectVifs(list) => list.total_count,
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Runs the handler for `kind`.
pub(crate) async fn fetch_section(
    kind: SectionKind,
    ctx: &CallContext<'_>,
    resource_id: &str,
) -> Result<SectionRecord, FetchError> {
    let record = match kind {
        SectionKind::Vpc => SectionRecord::Vpc(network::vpc(ctx, resource_id).await?),
        SectionKind::VpcAttributes => {
            SectionRecord::VpcAttributes(network::vpc_attributes(ctx, resource_id).await?)
        }
        SectionKind::Subnets => SectionRecord::Subnets(network::subnets(ctx, resource_id).await?),
        SectionKind::RouteTables => {
            SectionRecord::RouteTables(network::route_tables(ctx, resource_id).await?)
        }
        SectionKind::InternetGateways => {
            SectionRecord::InternetGateways(gateways::internet_gateways(ctx, resource_id).await?)
        }
        SectionKind::NatGateways => {
            SectionRecord::NatGateways(gateways::nat_gateways(ctx, resource_id).await?)
        }
        SectionKind::ElasticIps => SectionRecord::ElasticIps(gateways::elastic_ips(ctx).await?),
        SectionKind::SecurityGroups => {
            SectionRecord::SecurityGroups(network::security_groups(ctx, resource_id).await?)
        }
        SectionKind::NetworkAcls => {
            SectionRecord::NetworkAcls(network::network_acls(ctx, resource_id).await?)
        }
        SectionKind::VpcEndpoints => {
            SectionRecord::VpcEndpoints(gateways::vpc_endpoints(ctx, resource_id).await?)
        }
        SectionKind::VpcPeering => {
            SectionRecord::VpcPeering(gateways::vpc_peering(ctx, resource_id).await?)
        }
        SectionKind::TransitGatewayAttachments => SectionRecord::TransitGatewayAttachments(
            gateways::transit_gateway_attachments(ctx, resource_id).await?,
        ),
        SectionKind::VpnConnections => {
            SectionRecord::VpnConnections(gateways::vpn_connections(ctx).await?)
        }
        SectionKind::CustomerGateways => {
            SectionRecord::CustomerGateways(gateways::customer_gateways(ctx).await?)
        }
        SectionKind::VpnGateways => {
            SectionRecord::VpnGateways(gateways::vpn_gateways(ctx, resource_id).await?)
        }
        SectionKind::DhcpOptions => {
            SectionRecord::DhcpOptions(network::dhcp_options(ctx, resource_id).await?)
        }
        SectionKind::FlowLogs => SectionRecord::FlowLogs(network::flow_logs(ctx, resource_id).await?),
        SectionKind::NetworkInterfaces => {
            SectionRecord::NetworkInterfaces(network::network_interfaces(ctx, resource_id).await?)
        }
        SectionKind::DirectConnectVifs => {
            SectionRecord::DirectConnectVifs(gateways::direct_connect_vifs(ctx).await?)
        }
    };
    Ok(record)
}

// ============================================================================
// Helpers shared by handlers
// ============================================================================

pub(crate) fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(|e| FetchError::Malformed(format!("{what}: {e}")))
}

/// Lists `list_key` for `request`, decodes every item and resolves its name.
pub(crate) async fn list_tagged<T>(
    ctx: &CallContext<'_>,
    request: ApiRequest,
    list_key: &str,
) -> Result<Vec<T>, FetchError>
where
    T: DeserializeOwned + Tagged,
{
    ctx.list(&request, list_key)
        .await?
        .into_iter()
        .map(|item| {
            let mut resource: T = decode(item, list_key)?;
            resource.resolve_name();
            Ok(resource)
        })
        .collect()
}

//! Gateway, connectivity and addressing sections.
//!
//! Several of these are region-wide rather than VPC-scoped: Elastic IPs,
//! VPN connections, customer gateways and Direct Connect virtual interfaces
//! are listed for the whole region.

use super::{impl_tagged, list_tagged, ResourceList, Tag, Tagged};
use crate::fetch::{CallContext, FetchError};
use crate::traits::ApiRequest;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

// ============================================================================
// Internet gateways
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InternetGateway {
    pub internet_gateway_id: String,
    pub owner_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<GatewayAttachment>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GatewayAttachment {
    pub vpc_id: Option<String>,
    pub state: Option<String>,
}

impl_tagged!(InternetGateway);

pub(crate) async fn internet_gateways(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<InternetGateway>, FetchError> {
    let request = ApiRequest::ec2_filtered("DescribeInternetGateways", "attachment.vpc-id", vpc_id);
    Ok(ResourceList::new(
        list_tagged(ctx, request, "InternetGateways").await?,
    ))
}

// ============================================================================
// NAT gateways
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NatGateway {
    pub nat_gateway_id: String,
    pub subnet_id: Option<String>,
    pub vpc_id: Option<String>,
    pub state: Option<String>,
    pub connectivity_type: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    #[serde(default)]
    pub nat_gateway_addresses: Vec<NatGatewayAddress>,
    /// Public IP of the primary address, if any
    #[serde(default)]
    pub primary_public_ip: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NatGatewayAddress {
    pub allocation_id: Option<String>,
    pub network_interface_id: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub association_id: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    pub status: Option<String>,
}

impl_tagged!(NatGateway);

impl NatGateway {
    fn primary_address(&self) -> Option<&NatGatewayAddress> {
        self.nat_gateway_addresses
            .iter()
            .find(|addr| addr.is_primary)
            .or_else(|| self.nat_gateway_addresses.first())
    }
}

pub(crate) async fn nat_gateways(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<NatGateway>, FetchError> {
    let request = ApiRequest::ec2_filtered("DescribeNatGateways", "vpc-id", vpc_id);
    let mut gateways: Vec<NatGateway> = list_tagged(ctx, request, "NatGateways").await?;
    for gateway in &mut gateways {
        gateway.primary_public_ip = gateway
            .primary_address()
            .and_then(|addr| addr.public_ip.clone());
    }
    Ok(ResourceList::new(gateways))
}

// ============================================================================
// Elastic IPs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElasticIpsRecord {
    pub total_count: usize,
    pub associated_count: usize,
    pub unassociated_count: usize,
    pub elastic_ips: Vec<ElasticIp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElasticIp {
    pub public_ip: Option<String>,
    pub allocation_id: Option<String>,
    pub domain: Option<String>,
    pub association_id: Option<String>,
    pub instance_id: Option<String>,
    pub network_interface_id: Option<String>,
    pub private_ip_address: Option<String>,
    pub network_border_group: Option<String>,
    pub public_ipv4_pool: Option<String>,
    #[serde(default)]
    pub is_associated: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

impl_tagged!(ElasticIp);

/// Region-wide: every VPC-domain address, associated or not.
pub(crate) async fn elastic_ips(ctx: &CallContext<'_>) -> Result<ElasticIpsRecord, FetchError> {
    let request = ApiRequest::ec2_filtered("DescribeAddresses", "domain", "vpc");
    let mut addresses: Vec<ElasticIp> = list_tagged(ctx, request, "Addresses").await?;
    for addr in &mut addresses {
        addr.is_associated = addr.association_id.is_some();
    }

    let associated_count = addresses.iter().filter(|addr| addr.is_associated).count();
    Ok(ElasticIpsRecord {
        total_count: addresses.len(),
        associated_count,
        unassociated_count: addresses.len() - associated_count,
        elastic_ips: addresses,
    })
}

// ============================================================================
// VPC endpoints
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcEndpoint {
    pub vpc_endpoint_id: String,
    pub vpc_endpoint_type: Option<String>,
    pub vpc_id: Option<String>,
    pub service_name: Option<String>,
    pub state: Option<String>,
    #[serde(default)]
    pub route_table_ids: Vec<String>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub network_interface_ids: Vec<String>,
    #[serde(default)]
    pub private_dns_enabled: bool,
    #[serde(default)]
    pub requester_managed: bool,
    pub owner_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

impl_tagged!(VpcEndpoint);

pub(crate) async fn vpc_endpoints(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<VpcEndpoint>, FetchError> {
    let request = ApiRequest::ec2_filtered("DescribeVpcEndpoints", "vpc-id", vpc_id);
    Ok(ResourceList::new(
        list_tagged(ctx, request, "VpcEndpoints").await?,
    ))
}

// ============================================================================
// VPC peering
// ============================================================================

/// Which side of a peering connection the collected VPC is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeeringRole {
    Requester,
    Accepter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeeringConnection {
    pub vpc_peering_connection_id: String,
    pub status: Option<PeeringStatus>,
    pub requester_vpc_info: Option<PeeringVpcInfo>,
    pub accepter_vpc_info: Option<PeeringVpcInfo>,
    #[serde(default)]
    pub role: Option<PeeringRole>,
    #[serde(default)]
    pub is_cross_account: bool,
    #[serde(default)]
    pub is_cross_region: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeeringStatus {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeeringVpcInfo {
    pub vpc_id: Option<String>,
    pub owner_id: Option<String>,
    pub cidr_block: Option<String>,
    pub region: Option<String>,
}

impl_tagged!(PeeringConnection);

impl PeeringConnection {
    fn classify(&mut self, vpc_id: &str) {
        let requester = self.requester_vpc_info.as_ref();
        let accepter = self.accepter_vpc_info.as_ref();

        let is_requester = requester.and_then(|info| info.vpc_id.as_deref()) == Some(vpc_id);
        self.role = Some(if is_requester {
            PeeringRole::Requester
        } else {
            PeeringRole::Accepter
        });
        self.is_cross_account = requester.and_then(|i| i.owner_id.as_deref())
            != accepter.and_then(|i| i.owner_id.as_deref());
        self.is_cross_region = requester.and_then(|i| i.region.as_deref())
            != accepter.and_then(|i| i.region.as_deref());
    }
}

/// Both sides of the VPC's peerings: one call as requester, one as accepter.
pub(crate) async fn vpc_peering(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<PeeringConnection>, FetchError> {
    let mut by_id: BTreeMap<String, PeeringConnection> = BTreeMap::new();
    for filter in ["requester-vpc-info.vpc-id", "accepter-vpc-info.vpc-id"] {
        let request = ApiRequest::ec2_filtered("DescribeVpcPeeringConnections", filter, vpc_id);
        let side: Vec<PeeringConnection> =
            list_tagged(ctx, request, "VpcPeeringConnections").await?;
        for peering in side {
            by_id.insert(peering.vpc_peering_connection_id.clone(), peering);
        }
    }

    let mut peerings: Vec<PeeringConnection> = by_id.into_values().collect();
    for peering in &mut peerings {
        peering.classify(vpc_id);
    }
    Ok(ResourceList::new(peerings))
}

// ============================================================================
// Transit gateway attachments
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransitGatewayAttachment {
    pub transit_gateway_attachment_id: String,
    pub transit_gateway_id: Option<String>,
    pub vpc_id: Option<String>,
    pub vpc_owner_id: Option<String>,
    pub state: Option<String>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    pub options: Option<TransitGatewayAttachmentOptions>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransitGatewayAttachmentOptions {
    pub dns_support: Option<String>,
    pub ipv6_support: Option<String>,
    pub appliance_mode_support: Option<String>,
    pub security_group_referencing_support: Option<String>,
}

impl_tagged!(TransitGatewayAttachment);

pub(crate) async fn transit_gateway_attachments(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<TransitGatewayAttachment>, FetchError> {
    let request =
        ApiRequest::ec2_filtered("DescribeTransitGatewayVpcAttachments", "vpc-id", vpc_id);
    Ok(ResourceList::new(
        list_tagged(ctx, request, "TransitGatewayVpcAttachments").await?,
    ))
}

// ============================================================================
// VPN connections and gateways
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpnConnection {
    pub vpn_connection_id: String,
    pub state: Option<String>,
    #[serde(rename = "Type")]
    pub connection_type: Option<String>,
    pub customer_gateway_id: Option<String>,
    pub vpn_gateway_id: Option<String>,
    pub transit_gateway_id: Option<String>,
    #[serde(default)]
    pub routes: Vec<VpnStaticRoute>,
    #[serde(default)]
    pub vgw_telemetry: Vec<VpnTunnelTelemetry>,
    #[serde(default)]
    pub tunnels_up: usize,
    #[serde(default)]
    pub tunnels_down: usize,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpnStaticRoute {
    pub destination_cidr_block: Option<String>,
    pub source: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpnTunnelTelemetry {
    pub outside_ip_address: Option<String>,
    /// `UP` or `DOWN`
    pub status: Option<String>,
    pub status_message: Option<String>,
    #[serde(default)]
    pub accepted_route_count: u64,
}

impl_tagged!(VpnConnection);

fn status_is(status: Option<&str>, expected: &str) -> bool {
    status.is_some_and(|s| s.eq_ignore_ascii_case(expected))
}

/// Region-wide: VPN connections attach to gateways, not to VPCs.
pub(crate) async fn vpn_connections(
    ctx: &CallContext<'_>,
) -> Result<ResourceList<VpnConnection>, FetchError> {
    let request = ApiRequest::ec2("DescribeVpnConnections", json!({}));
    let mut connections: Vec<VpnConnection> =
        list_tagged(ctx, request, "VpnConnections").await?;
    for vpn in &mut connections {
        let statuses = || vpn.vgw_telemetry.iter().map(|t| t.status.as_deref());
        let up = statuses().filter(|s| status_is(*s, "up")).count();
        let down = statuses().filter(|s| status_is(*s, "down")).count();
        vpn.tunnels_up = up;
        vpn.tunnels_down = down;
    }
    Ok(ResourceList::new(connections))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerGateway {
    pub customer_gateway_id: String,
    pub state: Option<String>,
    #[serde(rename = "Type")]
    pub gateway_type: Option<String>,
    pub ip_address: Option<String>,
    pub bgp_asn: Option<String>,
    pub device_name: Option<String>,
    pub certificate_arn: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

impl_tagged!(CustomerGateway);

pub(crate) async fn customer_gateways(
    ctx: &CallContext<'_>,
) -> Result<ResourceList<CustomerGateway>, FetchError> {
    let request = ApiRequest::ec2("DescribeCustomerGateways", json!({}));
    Ok(ResourceList::new(
        list_tagged(ctx, request, "CustomerGateways").await?,
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpnGateway {
    pub vpn_gateway_id: String,
    pub state: Option<String>,
    #[serde(rename = "Type")]
    pub gateway_type: Option<String>,
    pub availability_zone: Option<String>,
    pub amazon_side_asn: Option<i64>,
    #[serde(default)]
    pub vpc_attachments: Vec<GatewayAttachment>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

impl_tagged!(VpnGateway);

pub(crate) async fn vpn_gateways(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<VpnGateway>, FetchError> {
    let request = ApiRequest::ec2_filtered("DescribeVpnGateways", "attachment.vpc-id", vpc_id);
    Ok(ResourceList::new(
        list_tagged(ctx, request, "VpnGateways").await?,
    ))
}

// ============================================================================
// Direct Connect virtual interfaces
// ============================================================================

/// Direct Connect answers in camelCase, so these records keep that casing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualInterface {
    pub virtual_interface_id: String,
    pub virtual_interface_name: Option<String>,
    pub virtual_interface_type: Option<String>,
    pub virtual_interface_state: Option<String>,
    pub connection_id: Option<String>,
    pub owner_account: Option<String>,
    pub location: Option<String>,
    pub region: Option<String>,
    pub vlan: Option<i64>,
    pub asn: Option<i64>,
    pub amazon_side_asn: Option<i64>,
    pub mtu: Option<i64>,
    #[serde(default)]
    pub jumbo_frame_capable: bool,
    pub virtual_gateway_id: Option<String>,
    pub direct_connect_gateway_id: Option<String>,
    #[serde(default)]
    pub bgp_peers: Vec<BgpPeer>,
    #[serde(default)]
    pub bgp_status_summary: BgpStatusSummary,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgpPeer {
    pub bgp_peer_id: Option<String>,
    pub asn: Option<i64>,
    pub address_family: Option<String>,
    pub amazon_address: Option<String>,
    pub customer_address: Option<String>,
    pub bgp_peer_state: Option<String>,
    /// `up`, `down` or `unknown`
    pub bgp_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BgpStatusSummary {
    pub up: usize,
    pub down: usize,
    pub unknown: usize,
}

impl BgpStatusSummary {
    fn from_peers(peers: &[BgpPeer]) -> Self {
        let mut summary = Self::default();
        for peer in peers {
            match peer.bgp_status.as_deref() {
                Some(s) if s.eq_ignore_ascii_case("up") => summary.up += 1,
                Some(s) if s.eq_ignore_ascii_case("down") => summary.down += 1,
                _ => summary.unknown += 1,
            }
        }
        summary
    }

    pub fn all_up(&self) -> bool {
        self.up > 0 && self.down == 0 && self.unknown == 0
    }
}

impl_tagged!(VirtualInterface);

/// Region-wide, served by the Direct Connect API. The VIF name doubles as its
/// display name when there is no `Name` tag.
pub(crate) async fn direct_connect_vifs(
    ctx: &CallContext<'_>,
) -> Result<ResourceList<VirtualInterface>, FetchError> {
    let request = ApiRequest::direct_connect("DescribeVirtualInterfaces", json!({}));
    let mut vifs: Vec<VirtualInterface> =
        list_tagged(ctx, request, "virtualInterfaces").await?;
    for vif in &mut vifs {
        vif.bgp_status_summary = BgpStatusSummary::from_peers(&vif.bgp_peers);
        if vif.name.is_none() {
            let fallback = vif.virtual_interface_name.clone();
            vif.set_name(fallback);
        }
    }
    Ok(ResourceList::new(vifs))
}

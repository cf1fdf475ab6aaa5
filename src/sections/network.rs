//! VPC core, addressing and filtering sections.

use super::{decode, impl_tagged, list_tagged, ResourceList, Tag};
use crate::fetch::{CallContext, FetchError};
use crate::traits::ApiRequest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

// ============================================================================
// VPC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcRecord {
    pub vpc_id: String,
    pub cidr_block: String,
    pub state: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub instance_tenancy: Option<String>,
    pub dhcp_options_id: Option<String>,
    pub owner_id: Option<String>,
    #[serde(default)]
    pub cidr_block_association_set: Vec<CidrAssociation>,
    #[serde(default)]
    pub ipv6_cidr_block_association_set: Vec<Ipv6CidrAssociation>,
    /// Associated IPv4 blocks other than the primary one
    #[serde(default)]
    pub additional_cidr_blocks: Vec<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CidrAssociation {
    pub association_id: Option<String>,
    pub cidr_block: Option<String>,
    pub cidr_block_state: Option<BlockState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipv6CidrAssociation {
    pub association_id: Option<String>,
    pub ipv6_cidr_block: Option<String>,
    pub ipv6_pool: Option<String>,
    pub network_border_group: Option<String>,
    pub ipv6_cidr_block_state: Option<BlockState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockState {
    pub state: Option<String>,
    pub status_message: Option<String>,
}

impl_tagged!(VpcRecord);

/// Describes the VPC itself. An empty answer means the VPC does not exist.
async fn describe_vpc(ctx: &CallContext<'_>, vpc_id: &str) -> Result<VpcRecord, FetchError> {
    let request = ApiRequest::ec2("DescribeVpcs", json!({ "VpcIds": [vpc_id] }));
    let mut vpcs = ctx.list(&request, "Vpcs").await?;
    if vpcs.is_empty() {
        return Err(FetchError::NotFound(format!("VPC {vpc_id} not found")));
    }
    decode(vpcs.swap_remove(0), "Vpcs")
}

pub(crate) async fn vpc(ctx: &CallContext<'_>, vpc_id: &str) -> Result<VpcRecord, FetchError> {
    let mut vpc = describe_vpc(ctx, vpc_id).await?;
    vpc.additional_cidr_blocks = vpc
        .cidr_block_association_set
        .iter()
        .filter_map(|assoc| assoc.cidr_block.clone())
        .filter(|block| *block != vpc.cidr_block)
        .collect();
    super::Tagged::resolve_name(&mut vpc);
    Ok(vpc)
}

// ============================================================================
// VPC attributes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcAttributesRecord {
    pub vpc_id: String,
    pub enable_dns_support: bool,
    pub enable_dns_hostnames: bool,
    pub enable_network_address_usage_metrics: bool,
}

/// One `DescribeVpcAttribute` call; the answer nests the flag under the
/// attribute's PascalCase name.
async fn vpc_attribute(
    ctx: &CallContext<'_>,
    vpc_id: &str,
    attribute: &str,
    response_key: &str,
) -> Result<bool, FetchError> {
    let request = ApiRequest::ec2(
        "DescribeVpcAttribute",
        json!({ "VpcId": vpc_id, "Attribute": attribute }),
    );
    let response = ctx.call(&request).await?;
    response
        .get(response_key)
        .and_then(|flag| flag.get("Value"))
        .and_then(Value::as_bool)
        .ok_or_else(|| {
            FetchError::Malformed(format!("DescribeVpcAttribute: missing {response_key}.Value"))
        })
}

pub(crate) async fn vpc_attributes(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<VpcAttributesRecord, FetchError> {
    Ok(VpcAttributesRecord {
        vpc_id: vpc_id.to_string(),
        enable_dns_support: vpc_attribute(ctx, vpc_id, "enableDnsSupport", "EnableDnsSupport")
            .await?,
        enable_dns_hostnames: vpc_attribute(
            ctx,
            vpc_id,
            "enableDnsHostnames",
            "EnableDnsHostnames",
        )
        .await?,
        enable_network_address_usage_metrics: vpc_attribute(
            ctx,
            vpc_id,
            "enableNetworkAddressUsageMetrics",
            "EnableNetworkAddressUsageMetrics",
        )
        .await?,
    })
}

// ============================================================================
// Subnets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subnet {
    pub subnet_id: String,
    pub cidr_block: String,
    pub availability_zone: String,
    pub availability_zone_id: Option<String>,
    #[serde(default)]
    pub available_ip_address_count: u64,
    #[serde(default)]
    pub map_public_ip_on_launch: bool,
    pub state: Option<String>,
    #[serde(default)]
    pub default_for_az: bool,
    #[serde(default)]
    pub assign_ipv6_address_on_creation: bool,
    #[serde(default)]
    pub ipv6_native: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

impl_tagged!(Subnet);

pub(crate) async fn subnets(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<Subnet>, FetchError> {
    let request = ApiRequest::ec2_filtered("DescribeSubnets", "vpc-id", vpc_id);
    Ok(ResourceList::new(list_tagged(ctx, request, "Subnets").await?))
}

// ============================================================================
// Route tables
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteTable {
    pub route_table_id: String,
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub associations: Vec<RouteTableAssociation>,
    #[serde(default)]
    pub propagating_vgws: Vec<PropagatingVgw>,
    /// Whether this is the VPC's main route table
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Route {
    pub destination_cidr_block: Option<String>,
    pub destination_ipv6_cidr_block: Option<String>,
    pub destination_prefix_list_id: Option<String>,
    pub gateway_id: Option<String>,
    pub nat_gateway_id: Option<String>,
    pub transit_gateway_id: Option<String>,
    pub vpc_peering_connection_id: Option<String>,
    pub network_interface_id: Option<String>,
    pub instance_id: Option<String>,
    pub local_gateway_id: Option<String>,
    pub carrier_gateway_id: Option<String>,
    pub egress_only_internet_gateway_id: Option<String>,
    pub core_network_arn: Option<String>,
    pub state: Option<String>,
    pub origin: Option<String>,
    /// Resolved next hop, whichever target field is set first
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub target_type: Option<RouteTargetType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTargetType {
    Gateway,
    NatGateway,
    TransitGateway,
    VpcPeering,
    NetworkInterface,
    Instance,
    LocalGateway,
    CarrierGateway,
    EgressOnlyInternetGateway,
    CoreNetwork,
}

impl Route {
    /// Destination in CIDR, IPv6 CIDR, prefix list order.
    pub fn destination(&self) -> Option<&str> {
        self.destination_cidr_block
            .as_deref()
            .or(self.destination_ipv6_cidr_block.as_deref())
            .or(self.destination_prefix_list_id.as_deref())
    }

    fn resolve_target(&mut self) {
        let candidates = [
            (&self.gateway_id, RouteTargetType::Gateway),
            (&self.nat_gateway_id, RouteTargetType::NatGateway),
            (&self.transit_gateway_id, RouteTargetType::TransitGateway),
            (&self.vpc_peering_connection_id, RouteTargetType::VpcPeering),
            (&self.network_interface_id, RouteTargetType::NetworkInterface),
            (&self.instance_id, RouteTargetType::Instance),
            (&self.local_gateway_id, RouteTargetType::LocalGateway),
            (&self.carrier_gateway_id, RouteTargetType::CarrierGateway),
            (
                &self.egress_only_internet_gateway_id,
                RouteTargetType::EgressOnlyInternetGateway,
            ),
            (&self.core_network_arn, RouteTargetType::CoreNetwork),
        ];
        let resolved = candidates.into_iter().find_map(|(id, kind)| {
            id.as_deref()
                .filter(|id| !id.is_empty())
                .map(|id| (id.to_string(), kind))
        });
        (self.target, self.target_type) = match resolved {
            Some((id, kind)) => (Some(id), Some(kind)),
            None => (None, None),
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PropagatingVgw {
    pub gateway_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteTableAssociation {
    pub route_table_association_id: Option<String>,
    pub subnet_id: Option<String>,
    pub gateway_id: Option<String>,
    #[serde(default)]
    pub main: bool,
}

impl_tagged!(RouteTable);

pub(crate) async fn route_tables(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<RouteTable>, FetchError> {
    let request = ApiRequest::ec2_filtered("DescribeRouteTables", "vpc-id", vpc_id);
    let mut tables: Vec<RouteTable> = list_tagged(ctx, request, "RouteTables").await?;
    for table in &mut tables {
        table.is_main = table.associations.iter().any(|assoc| assoc.main);
        table.routes.iter_mut().for_each(Route::resolve_target);
    }
    Ok(ResourceList::new(tables))
}

// ============================================================================
// Security groups
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    pub group_id: String,
    pub group_name: String,
    pub description: Option<String>,
    pub vpc_id: Option<String>,
    pub owner_id: Option<String>,
    #[serde(default)]
    pub ip_permissions: Vec<IpPermission>,
    #[serde(default)]
    pub ip_permissions_egress: Vec<IpPermission>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpPermission {
    /// `-1` means all protocols
    pub ip_protocol: String,
    pub from_port: Option<i64>,
    pub to_port: Option<i64>,
    #[serde(default)]
    pub ip_ranges: Vec<IpRange>,
    #[serde(default)]
    pub ipv6_ranges: Vec<Ipv6Range>,
    #[serde(default)]
    pub user_id_group_pairs: Vec<UserIdGroupPair>,
    #[serde(default)]
    pub prefix_list_ids: Vec<PrefixListRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpRange {
    pub cidr_ip: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipv6Range {
    pub cidr_ipv6: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserIdGroupPair {
    pub group_id: Option<String>,
    pub user_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrefixListRef {
    pub prefix_list_id: String,
    pub description: Option<String>,
}

impl_tagged!(SecurityGroup);

pub(crate) async fn security_groups(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<SecurityGroup>, FetchError> {
    let request = ApiRequest::ec2_filtered("DescribeSecurityGroups", "vpc-id", vpc_id);
    Ok(ResourceList::new(
        list_tagged(ctx, request, "SecurityGroups").await?,
    ))
}

// ============================================================================
// Network ACLs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkAcl {
    pub network_acl_id: String,
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub entries: Vec<NetworkAclEntry>,
    #[serde(default)]
    pub associations: Vec<NetworkAclAssociation>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkAclEntry {
    pub rule_number: i64,
    pub protocol: String,
    pub rule_action: String,
    #[serde(default)]
    pub egress: bool,
    pub cidr_block: Option<String>,
    pub ipv6_cidr_block: Option<String>,
    pub port_range: Option<PortRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkAclAssociation {
    pub network_acl_association_id: Option<String>,
    pub subnet_id: Option<String>,
}

impl_tagged!(NetworkAcl);

pub(crate) async fn network_acls(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<NetworkAcl>, FetchError> {
    let request = ApiRequest::ec2_filtered("DescribeNetworkAcls", "vpc-id", vpc_id);
    let mut acls: Vec<NetworkAcl> = list_tagged(ctx, request, "NetworkAcls").await?;
    for acl in &mut acls {
        acl.entries.sort_by_key(|entry| (entry.egress, entry.rule_number));
    }
    Ok(ResourceList::new(acls))
}

// ============================================================================
// DHCP options
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DhcpOptionsRecord {
    /// `None` when the VPC has no DHCP options set
    pub dhcp_options_id: Option<String>,
    pub owner_id: Option<String>,
    /// Option key (`domain-name`, `domain-name-servers`, ...) to its values
    #[serde(default)]
    pub configurations: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

impl_tagged!(DhcpOptionsRecord);

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDhcpOptions {
    dhcp_options_id: String,
    owner_id: Option<String>,
    #[serde(default)]
    dhcp_configurations: Vec<RawDhcpConfiguration>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDhcpConfiguration {
    key: String,
    #[serde(default)]
    values: Vec<RawAttributeValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAttributeValue {
    value: Option<String>,
}

/// Resolves the VPC's DHCP options id, then describes that set.
pub(crate) async fn dhcp_options(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<DhcpOptionsRecord, FetchError> {
    let vpc = describe_vpc(ctx, vpc_id).await?;
    let Some(dhcp_options_id) = vpc.dhcp_options_id.filter(|id| !id.is_empty() && id != "default")
    else {
        return Ok(DhcpOptionsRecord::default());
    };

    let request = ApiRequest::ec2(
        "DescribeDhcpOptions",
        json!({ "DhcpOptionsIds": [dhcp_options_id] }),
    );
    let mut sets = ctx.list(&request, "DhcpOptions").await?;
    if sets.is_empty() {
        return Ok(DhcpOptionsRecord {
            dhcp_options_id: Some(dhcp_options_id),
            ..DhcpOptionsRecord::default()
        });
    }

    let raw: RawDhcpOptions = decode(sets.swap_remove(0), "DhcpOptions")?;
    let configurations = raw
        .dhcp_configurations
        .into_iter()
        .map(|config| {
            let values = config.values.into_iter().filter_map(|v| v.value).collect();
            (config.key, values)
        })
        .collect();

    let mut record = DhcpOptionsRecord {
        dhcp_options_id: Some(raw.dhcp_options_id),
        owner_id: raw.owner_id,
        configurations,
        tags: raw.tags,
        name: None,
    };
    super::Tagged::resolve_name(&mut record);
    Ok(record)
}

// ============================================================================
// Flow logs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FlowLog {
    pub flow_log_id: String,
    pub flow_log_status: Option<String>,
    pub resource_id: Option<String>,
    pub traffic_type: Option<String>,
    pub log_destination_type: Option<String>,
    pub log_destination: Option<String>,
    pub log_group_name: Option<String>,
    pub deliver_logs_status: Option<String>,
    pub max_aggregation_interval: Option<i64>,
    pub log_format: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

impl_tagged!(FlowLog);

pub(crate) async fn flow_logs(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<FlowLog>, FetchError> {
    let request = ApiRequest::ec2_filtered("DescribeFlowLogs", "resource-id", vpc_id);
    Ok(ResourceList::new(list_tagged(ctx, request, "FlowLogs").await?))
}

// ============================================================================
// Network interfaces
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkInterface {
    pub network_interface_id: String,
    pub interface_type: Option<String>,
    pub status: Option<String>,
    pub subnet_id: Option<String>,
    pub vpc_id: Option<String>,
    pub availability_zone: Option<String>,
    pub private_ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub requester_managed: bool,
    pub source_dest_check: Option<bool>,
    #[serde(default)]
    pub groups: Vec<GroupIdentifier>,
    pub attachment: Option<InterfaceAttachment>,
    pub association: Option<InterfaceAssociation>,
    #[serde(default)]
    pub private_ip_addresses: Vec<PrivateIpAddress>,
    /// Network interfaces report their tags as `TagSet`
    #[serde(default)]
    pub tag_set: Vec<Tag>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupIdentifier {
    pub group_id: Option<String>,
    pub group_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceAttachment {
    pub attachment_id: Option<String>,
    pub instance_id: Option<String>,
    pub instance_owner_id: Option<String>,
    pub device_index: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceAssociation {
    pub public_ip: Option<String>,
    pub public_dns_name: Option<String>,
    pub ip_owner_id: Option<String>,
    pub allocation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrivateIpAddress {
    pub private_ip_address: Option<String>,
    #[serde(default)]
    pub primary: bool,
    pub private_dns_name: Option<String>,
}

impl super::Tagged for NetworkInterface {
    fn tags(&self) -> &[Tag] {
        &self.tag_set
    }

    fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }
}

pub(crate) async fn network_interfaces(
    ctx: &CallContext<'_>,
    vpc_id: &str,
) -> Result<ResourceList<NetworkInterface>, FetchError> {
    let request = ApiRequest::ec2_filtered("DescribeNetworkInterfaces", "vpc-id", vpc_id);
    Ok(ResourceList::new(
        list_tagged(ctx, request, "NetworkInterfaces").await?,
    ))
}

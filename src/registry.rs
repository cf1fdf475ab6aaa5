//! Section registry - the closed catalog of collectable sections.
//!
//! [`SectionKind`] enumerates every section the collector knows about, in the
//! order reports are assembled. [`SectionRegistry`] is the immutable set of
//! kinds a collector is allowed to serve; it is built once and handed to the
//! collectors by value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One independently fetchable category of VPC metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Vpc,
    VpcAttributes,
    Subnets,
    RouteTables,
    InternetGateways,
    NatGateways,
    ElasticIps,
    SecurityGroups,
    NetworkAcls,
    VpcEndpoints,
    VpcPeering,
    TransitGatewayAttachments,
    VpnConnections,
    CustomerGateways,
    VpnGateways,
    DhcpOptions,
    FlowLogs,
    NetworkInterfaces,
    DirectConnectVifs,
}

impl SectionKind {
    /// Every section, in registry order.
    pub const ALL: [SectionKind; 19] = [
        SectionKind::Vpc,
        SectionKind::VpcAttributes,
        SectionKind::Subnets,
        SectionKind::RouteTables,
        SectionKind::InternetGateways,
        SectionKind::NatGateways,
        SectionKind::ElasticIps,
        SectionKind::SecurityGroups,
        SectionKind::NetworkAcls,
        SectionKind::VpcEndpoints,
        SectionKind::VpcPeering,
        SectionKind::TransitGatewayAttachments,
        SectionKind::VpnConnections,
        SectionKind::CustomerGateways,
        SectionKind::VpnGateways,
        SectionKind::DhcpOptions,
        SectionKind::FlowLogs,
        SectionKind::NetworkInterfaces,
        SectionKind::DirectConnectVifs,
    ];

    /// Stable snake_case identifier, used in logs, cache keys and parsing.
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Vpc => "vpc",
            SectionKind::VpcAttributes => "vpc_attributes",
            SectionKind::Subnets => "subnets",
            SectionKind::RouteTables => "route_tables",
            SectionKind::InternetGateways => "internet_gateways",
            SectionKind::NatGateways => "nat_gateways",
            SectionKind::ElasticIps => "elastic_ips",
            SectionKind::SecurityGroups => "security_groups",
            SectionKind::NetworkAcls => "network_acls",
            SectionKind::VpcEndpoints => "vpc_endpoints",
            SectionKind::VpcPeering => "vpc_peering",
            SectionKind::TransitGatewayAttachments => "transit_gateway_attachments",
            SectionKind::VpnConnections => "vpn_connections",
            SectionKind::CustomerGateways => "customer_gateways",
            SectionKind::VpnGateways => "vpn_gateways",
            SectionKind::DhcpOptions => "dhcp_options",
            SectionKind::FlowLogs => "flow_logs",
            SectionKind::NetworkInterfaces => "network_interfaces",
            SectionKind::DirectConnectVifs => "direct_connect_vifs",
        }
    }

    /// Canonical description of the filters applied when fetching this
    /// section for `resource_id`. Part of the cache key.
    pub fn filter_signature(&self, resource_id: &str) -> String {
        match self {
            SectionKind::Vpc | SectionKind::VpcAttributes | SectionKind::DhcpOptions => {
                format!("vpc-ids={resource_id}")
            }
            SectionKind::InternetGateways | SectionKind::VpnGateways => {
                format!("attachment.vpc-id={resource_id}")
            }
            SectionKind::FlowLogs => format!("resource-id={resource_id}"),
            SectionKind::VpcPeering => format!(
                "requester-vpc-info.vpc-id={resource_id};accepter-vpc-info.vpc-id={resource_id}"
            ),
            SectionKind::ElasticIps => "domain=vpc".to_string(),
            SectionKind::VpnConnections
            | SectionKind::CustomerGateways
            | SectionKind::DirectConnectVifs => "region".to_string(),
            SectionKind::Subnets
            | SectionKind::RouteTables
            | SectionKind::NatGateways
            | SectionKind::SecurityGroups
            | SectionKind::NetworkAcls
            | SectionKind::VpcEndpoints
            | SectionKind::TransitGatewayAttachments
            | SectionKind::NetworkInterfaces => format!("vpc-id={resource_id}"),
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown section: {0}")]
pub struct ParseSectionError(pub String);

impl FromStr for SectionKind {
    type Err = ParseSectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        SectionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ParseSectionError(s.to_string()))
    }
}

/// Immutable set of sections a collector serves, in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRegistry {
    kinds: Vec<SectionKind>,
}

impl SectionRegistry {
    /// A registry restricted to `kinds`; duplicates are dropped and the
    /// canonical order is restored.
    pub fn with_kinds(kinds: impl IntoIterator<Item = SectionKind>) -> Self {
        let mut kinds: Vec<SectionKind> = kinds.into_iter().collect();
        kinds.sort();
        kinds.dedup();
        Self { kinds }
    }

    pub fn kinds(&self) -> &[SectionKind] {
        &self.kinds
    }

    pub fn contains(&self, kind: SectionKind) -> bool {
        self.kinds.binary_search(&kind).is_ok()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for SectionRegistry {
    fn default() -> Self {
        Self {
            kinds: SectionKind::ALL.to_vec(),
        }
    }
}

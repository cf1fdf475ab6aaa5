#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use vpc_collector::{ApiClient, ApiError, ApiRequest, Clock, CollectorConfig, RetryPolicy};

/// In-process stand-in for the remote API: a small but complete VPC.
pub struct FakeAws {
    responses: HashMap<&'static str, Value>,
    failures: HashMap<&'static str, ApiError>,
    latency: Duration,
    calls: Mutex<HashMap<&'static str, usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeAws {
    pub fn new() -> Self {
        Self {
            responses: fixture(),
            failures: HashMap::new(),
            latency: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing(mut self, operation: &'static str, err: ApiError) -> Self {
        self.failures.insert(operation, err);
        self
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiClient for FakeAws {
    async fn call(&self, _region: &str, request: &ApiRequest) -> Result<Value, ApiError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(request.operation)
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.failures.get(request.operation) {
            return Err(err.clone());
        }
        self.responses
            .get(request.operation)
            .cloned()
            .ok_or_else(|| ApiError::Service {
                code: "InvalidAction".into(),
                message: request.operation.into(),
            })
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now = *now + ChronoDuration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Retries enabled but with millisecond backoff.
pub fn fast_config() -> CollectorConfig {
    CollectorConfig::default()
        .with_retry_policy(RetryPolicy::default().with_base_delay(Duration::from_millis(1)))
}

fn fixture() -> HashMap<&'static str, Value> {
    let mut r = HashMap::new();
    r.insert(
        "DescribeVpcs",
        json!({ "Vpcs": [{
            "VpcId": "vpc-1",
            "CidrBlock": "10.0.0.0/16",
            "State": "available",
            "DhcpOptionsId": "dopt-1",
            "Tags": [{ "Key": "Name", "Value": "prod" }]
        }]}),
    );
    r.insert(
        "DescribeVpcAttribute",
        json!({
            "EnableDnsSupport": { "Value": true },
            "EnableDnsHostnames": { "Value": true },
            "EnableNetworkAddressUsageMetrics": { "Value": false }
        }),
    );
    r.insert(
        "DescribeSubnets",
        json!({ "Subnets": [
            { "SubnetId": "subnet-a", "CidrBlock": "10.0.1.0/24", "AvailabilityZone": "us-east-1a" },
            { "SubnetId": "subnet-b", "CidrBlock": "10.0.2.0/24", "AvailabilityZone": "us-east-1b" }
        ]}),
    );
    r.insert(
        "DescribeRouteTables",
        json!({ "RouteTables": [{ "RouteTableId": "rtb-1", "Associations": [{ "Main": true }] }] }),
    );
    r.insert(
        "DescribeInternetGateways",
        json!({ "InternetGateways": [{ "InternetGatewayId": "igw-1", "Attachments": [{ "VpcId": "vpc-1", "State": "available" }] }] }),
    );
    r.insert(
        "DescribeNatGateways",
        json!({ "NatGateways": [{ "NatGatewayId": "nat-1", "NatGatewayAddresses": [{ "PublicIp": "1.2.3.4", "IsPrimary": true }] }] }),
    );
    r.insert(
        "DescribeAddresses",
        json!({ "Addresses": [{ "PublicIp": "1.2.3.4", "AllocationId": "eipalloc-1", "AssociationId": "eipassoc-1" }] }),
    );
    r.insert(
        "DescribeSecurityGroups",
        json!({ "SecurityGroups": [{
            "GroupId": "sg-1",
            "GroupName": "default",
            "IpPermissions": [{ "IpProtocol": "tcp", "FromPort": 443, "ToPort": 443, "IpRanges": [{ "CidrIp": "0.0.0.0/0" }] }]
        }]}),
    );
    r.insert(
        "DescribeNetworkAcls",
        json!({ "NetworkAcls": [{
            "NetworkAclId": "acl-1",
            "IsDefault": true,
            "Entries": [{ "RuleNumber": 100, "Protocol": "-1", "RuleAction": "allow", "Egress": false, "CidrBlock": "0.0.0.0/0" }]
        }]}),
    );
    r.insert("DescribeVpcEndpoints", json!({ "VpcEndpoints": [] }));
    r.insert(
        "DescribeVpcPeeringConnections",
        json!({ "VpcPeeringConnections": [] }),
    );
    r.insert(
        "DescribeTransitGatewayVpcAttachments",
        json!({ "TransitGatewayVpcAttachments": [] }),
    );
    r.insert("DescribeVpnConnections", json!({ "VpnConnections": [] }));
    r.insert("DescribeCustomerGateways", json!({ "CustomerGateways": [] }));
    r.insert("DescribeVpnGateways", json!({ "VpnGateways": [] }));
    r.insert(
        "DescribeDhcpOptions",
        json!({ "DhcpOptions": [{
            "DhcpOptionsId": "dopt-1",
            "DhcpConfigurations": [{ "Key": "domain-name", "Values": [{ "Value": "ec2.internal" }] }]
        }]}),
    );
    r.insert("DescribeFlowLogs", json!({ "FlowLogs": [] }));
    r.insert(
        "DescribeNetworkInterfaces",
        json!({ "NetworkInterfaces": [{ "NetworkInterfaceId": "eni-1", "TagSet": [] }] }),
    );
    r.insert("DescribeVirtualInterfaces", json!({ "virtualInterfaces": [] }));
    r
}

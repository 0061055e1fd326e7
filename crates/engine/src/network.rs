//! Network placement: subnets and security boundaries for the environment,
//! and the VPC declared when no existing network is supplied.

use airframe_types::PolicyStatement;
use airframe_util::attribute_token;
use heck::ToUpperCamelCase;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::DeploymentContext;
use crate::error::ConfigurationError;

pub const DEFAULT_SECURITY_GROUP_ID: &str = "MWAAEnvironmentSecurityGroup";
const SELF_REFERENCING_RULE: &str = "MWAA Self-referencing rule";

pub const VPC_ID: &str = "Vpc";
pub const S3_ENDPOINT_ID: &str = "S3Endpoint";
pub const MAX_AZS: u32 = 2;
pub const DEFAULT_SUBNET_MASK: u8 = 24;
pub const MIN_SUBNET_MASK: u8 = 16;
pub const MAX_SUBNET_MASK: u8 = 28;
const PUBLIC_SUBNET_GROUP: &str = "public-subnet";
const PRIVATE_SUBNET_GROUP: &str = "private-subnet";

/// Object actions any principal inside the VPC may perform through the S3 gateway endpoint.
pub const S3_ENDPOINT_ACTIONS: [&str; 4] = ["s3:Get*", "s3:List*", "s3:PutObject*", "s3:DeleteObject*"];

/// Interface endpoints a VPC without internet routing needs: logical id and service suffix.
const PRIVATE_INTERFACE_ENDPOINTS: [(&str, &str); 4] = [
    ("MonitoringEndpoint", "monitoring"),
    ("LogsEndpoint", "logs"),
    ("SQSEndpoint", "sqs"),
    ("KMSEndpoint", "kms"),
];

/// Where the environment is placed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkProps {
    pub vpc_id: String,
    /// Private subnets of the VPC, passed through unchanged.
    pub subnet_ids: Vec<String>,
    /// Existing security groups. When absent a default group is declared.
    #[serde(default)]
    pub security_group_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    /// Logical id of the peer group; here always the group itself.
    pub peer: String,
    pub protocol: String,
    pub description: String,
}

/// Security group admitting all traffic from its own members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    pub logical_id: String,
    pub vpc_id: String,
    pub ingress: Vec<IngressRule>,
}

impl SecurityGroup {
    pub fn self_referencing(logical_id: &str, vpc_id: &str) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            vpc_id: vpc_id.to_string(),
            ingress: vec![IngressRule {
                peer: logical_id.to_string(),
                protocol: "-1".to_string(),
                description: SELF_REFERENCING_RULE.to_string(),
            }],
        }
    }

    pub fn group_id(&self) -> String {
        attribute_token(&self.logical_id, "GroupId")
    }
}

/// Resolved network configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    pub security_group_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
}

/// Resolve placement, declaring the default security group when none were supplied.
pub fn resolve_network(props: &NetworkProps) -> (NetworkConfiguration, Option<SecurityGroup>) {
    let (security_group_ids, declared) = match &props.security_group_ids {
        Some(ids) => (ids.clone(), None),
        None => {
            let group = SecurityGroup::self_referencing(DEFAULT_SECURITY_GROUP_ID, &props.vpc_id);
            (vec![group.group_id()], Some(group))
        }
    };
    let configuration = NetworkConfiguration {
        security_group_ids,
        subnet_ids: props.subnet_ids.clone(),
    };
    (configuration, declared)
}

/// How a declared VPC reaches the outside world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VpcRouting {
    /// Public subnets with an internet gateway, private subnets with NAT egress.
    #[default]
    Public,
    /// Isolated subnets only; service traffic goes through interface endpoints.
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubnetType {
    Public,
    PrivateWithEgress,
    PrivateIsolated,
}

/// Inputs for a declared VPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VpcProps {
    #[serde(default)]
    pub routing: VpcRouting,
    #[serde(default)]
    pub vpc_name: Option<String>,
    /// CIDR block of the VPC; the provisioner's default when absent.
    #[serde(default)]
    pub ip_addresses: Option<String>,
    /// Defaults to one per availability zone with public routing. Ignored with private routing.
    #[serde(default)]
    pub nat_gateways: Option<u32>,
    #[serde(default)]
    pub subnet_cidr_mask: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub logical_id: String,
    /// Subnet group name, e.g. `private-subnet`.
    pub group: String,
    pub subnet_type: SubnetType,
    pub cidr_mask: u8,
    /// Zero-based availability zone slot.
    pub availability_zone: u32,
}

impl Subnet {
    pub fn subnet_id(&self) -> String {
        attribute_token(&self.logical_id, "SubnetId")
    }
}

/// Endpoint policy statement; unlike identity policies it names its principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointPolicyStatement {
    #[serde(rename = "Principal")]
    pub principal: String,
    #[serde(flatten)]
    pub statement: PolicyStatement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEndpoint {
    pub logical_id: String,
    pub service_name: String,
    pub subnet_types: Vec<SubnetType>,
    pub policy: Vec<EndpointPolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceEndpoint {
    pub logical_id: String,
    pub service_name: String,
    pub subnet_type: SubnetType,
    pub private_dns_enabled: bool,
}

/// A VPC declared for the environment, spread over two availability zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vpc {
    pub logical_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_addresses: Option<String>,
    pub max_azs: u32,
    pub nat_gateways: u32,
    pub create_internet_gateway: bool,
    pub subnets: Vec<Subnet>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gateway_endpoints: Vec<GatewayEndpoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interface_endpoints: Vec<InterfaceEndpoint>,
}

impl Vpc {
    /// Declare a VPC with the requested routing and an S3 gateway endpoint on every subnet group.
    pub fn new(context: &DeploymentContext, props: &VpcProps) -> Result<Self, ConfigurationError> {
        let cidr_mask = props.subnet_cidr_mask.unwrap_or(DEFAULT_SUBNET_MASK);
        if !(MIN_SUBNET_MASK..=MAX_SUBNET_MASK).contains(&cidr_mask) {
            return Err(ConfigurationError::SubnetMask { mask: cidr_mask });
        }

        let mut vpc = match props.routing {
            VpcRouting::Public => Self::layout(
                props,
                true,
                props.nat_gateways.unwrap_or(MAX_AZS),
                &[(PUBLIC_SUBNET_GROUP, SubnetType::Public), (PRIVATE_SUBNET_GROUP, SubnetType::PrivateWithEgress)],
                cidr_mask,
            ),
            VpcRouting::Private => {
                Self::layout(props, false, 0, &[(PRIVATE_SUBNET_GROUP, SubnetType::PrivateIsolated)], cidr_mask)
            }
        };

        let subnet_types = vpc.subnet_groups();
        vpc.gateway_endpoints.push(GatewayEndpoint {
            logical_id: S3_ENDPOINT_ID.to_string(),
            service_name: context.service_endpoint("s3"),
            subnet_types,
            policy: vec![EndpointPolicyStatement {
                principal: "*".to_string(),
                statement: PolicyStatement::allow(S3_ENDPOINT_ACTIONS).on(["*"]),
            }],
        });

        if props.routing == VpcRouting::Private {
            vpc.interface_endpoints = PRIVATE_INTERFACE_ENDPOINTS
                .iter()
                .map(|(logical_id, service)| InterfaceEndpoint {
                    logical_id: logical_id.to_string(),
                    service_name: context.service_endpoint(service),
                    subnet_type: SubnetType::PrivateIsolated,
                    private_dns_enabled: true,
                })
                .collect();
        }

        debug!(
            routing = ?props.routing,
            subnets = vpc.subnets.len(),
            interface_endpoints = vpc.interface_endpoints.len(),
            "declared vpc"
        );
        Ok(vpc)
    }

    /// The plain two-zone public/private VPC used when a layout needs one and none was given.
    pub fn environment_default() -> Self {
        Self::layout(
            &VpcProps::default(),
            true,
            MAX_AZS,
            &[(PUBLIC_SUBNET_GROUP, SubnetType::Public), (PRIVATE_SUBNET_GROUP, SubnetType::PrivateWithEgress)],
            DEFAULT_SUBNET_MASK,
        )
    }

    fn layout(
        props: &VpcProps,
        create_internet_gateway: bool,
        nat_gateways: u32,
        groups: &[(&str, SubnetType)],
        cidr_mask: u8,
    ) -> Self {
        let subnets = groups
            .iter()
            .flat_map(|(group, subnet_type)| {
                (0..MAX_AZS).map(move |zone| Subnet {
                    logical_id: format!("{VPC_ID}{}{}", group.to_upper_camel_case(), zone + 1),
                    group: group.to_string(),
                    subnet_type: *subnet_type,
                    cidr_mask,
                    availability_zone: zone,
                })
            })
            .collect();
        Self {
            logical_id: VPC_ID.to_string(),
            vpc_name: props.vpc_name.clone(),
            ip_addresses: props.ip_addresses.clone(),
            max_azs: MAX_AZS,
            nat_gateways,
            create_internet_gateway,
            subnets,
            gateway_endpoints: Vec::new(),
            interface_endpoints: Vec::new(),
        }
    }

    fn subnet_groups(&self) -> Vec<SubnetType> {
        let mut types = Vec::new();
        for subnet in &self.subnets {
            if !types.contains(&subnet.subnet_type) {
                types.push(subnet.subnet_type);
            }
        }
        types
    }

    pub fn vpc_id(&self) -> String {
        attribute_token(&self.logical_id, "VpcId")
    }

    /// Subnets the environment is placed in: every non-public subnet.
    pub fn private_subnet_ids(&self) -> Vec<String> {
        self.subnets
            .iter()
            .filter(|subnet| subnet.subnet_type != SubnetType::Public)
            .map(Subnet::subnet_id)
            .collect()
    }

    /// Placement in this VPC, with the default security group.
    pub fn network_props(&self) -> NetworkProps {
        NetworkProps {
            vpc_id: self.vpc_id(),
            subnet_ids: self.private_subnet_ids(),
            security_group_ids: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(security_group_ids: Option<Vec<String>>) -> NetworkProps {
        NetworkProps {
            vpc_id: "vpc-0abc".to_string(),
            subnet_ids: vec!["subnet-a".to_string(), "subnet-b".to_string()],
            security_group_ids,
        }
    }

    #[test]
    fn default_group_is_declared_when_none_supplied() {
        let (configuration, group) = resolve_network(&props(None));
        let group = group.expect("default group");
        assert_eq!(configuration.security_group_ids, vec!["${MWAAEnvironmentSecurityGroup.GroupId}"]);
        assert_eq!(configuration.subnet_ids, vec!["subnet-a", "subnet-b"]);
        assert_eq!(group.vpc_id, "vpc-0abc");
        assert_eq!(group.ingress[0].peer, group.logical_id);
        assert_eq!(group.ingress[0].description, "MWAA Self-referencing rule");
    }

    #[test]
    fn supplied_groups_are_used_as_is() {
        let (configuration, group) = resolve_network(&props(Some(vec!["sg-123".to_string()])));
        assert!(group.is_none());
        assert_eq!(configuration.security_group_ids, vec!["sg-123"]);
    }

    fn ctx() -> DeploymentContext {
        DeploymentContext::new("eu-west-1", "111122223333")
    }

    #[test]
    fn public_routing_vpc_has_public_and_egress_subnets() {
        let vpc = Vpc::new(&ctx(), &VpcProps::default()).unwrap();
        assert!(vpc.create_internet_gateway);
        assert_eq!(vpc.nat_gateways, 2);
        assert_eq!(vpc.subnets.len(), 4);
        assert!(vpc.subnets.iter().all(|subnet| subnet.cidr_mask == 24));
        assert_eq!(vpc.subnets[0].logical_id, "VpcPublicSubnet1");
        assert!(vpc.interface_endpoints.is_empty());

        let endpoint = &vpc.gateway_endpoints[0];
        assert_eq!(endpoint.logical_id, "S3Endpoint");
        assert_eq!(endpoint.service_name, "com.amazonaws.eu-west-1.s3");
        assert_eq!(endpoint.subnet_types, vec![SubnetType::Public, SubnetType::PrivateWithEgress]);

        let network = vpc.network_props();
        assert_eq!(network.vpc_id, "${Vpc.VpcId}");
        assert_eq!(
            network.subnet_ids,
            vec!["${VpcPrivateSubnet1.SubnetId}", "${VpcPrivateSubnet2.SubnetId}"]
        );
    }

    #[test]
    fn s3_endpoint_policy_allows_object_access_for_any_principal() {
        let vpc = Vpc::new(&ctx(), &VpcProps::default()).unwrap();
        let rendered = serde_json::to_value(&vpc.gateway_endpoints[0].policy).unwrap();
        assert_eq!(
            rendered,
            serde_json::json!([{
                "Principal": "*",
                "Effect": "Allow",
                "Action": ["s3:Get*", "s3:List*", "s3:PutObject*", "s3:DeleteObject*"],
                "Resource": ["*"]
            }])
        );
    }

    #[test]
    fn private_routing_vpc_is_isolated_with_service_endpoints() {
        let props = VpcProps {
            routing: VpcRouting::Private,
            nat_gateways: Some(3),
            subnet_cidr_mask: Some(20),
            ..Default::default()
        };
        let vpc = Vpc::new(&ctx(), &props).unwrap();
        assert!(!vpc.create_internet_gateway);
        assert_eq!(vpc.nat_gateways, 0);
        assert_eq!(vpc.subnets.len(), 2);
        assert!(vpc.subnets.iter().all(|subnet| subnet.subnet_type == SubnetType::PrivateIsolated && subnet.cidr_mask == 20));
        assert_eq!(vpc.gateway_endpoints[0].subnet_types, vec![SubnetType::PrivateIsolated]);

        let services: Vec<&str> = vpc.interface_endpoints.iter().map(|e| e.service_name.as_str()).collect();
        assert_eq!(
            services,
            vec![
                "com.amazonaws.eu-west-1.monitoring",
                "com.amazonaws.eu-west-1.logs",
                "com.amazonaws.eu-west-1.sqs",
                "com.amazonaws.eu-west-1.kms",
            ]
        );
        assert!(vpc.interface_endpoints.iter().all(|e| e.private_dns_enabled));
        assert_eq!(vpc.private_subnet_ids().len(), 2);
    }

    #[test]
    fn subnet_masks_outside_the_allowed_range_are_rejected() {
        let props = VpcProps {
            subnet_cidr_mask: Some(30),
            ..Default::default()
        };
        assert_eq!(Vpc::new(&ctx(), &props).unwrap_err(), ConfigurationError::SubnetMask { mask: 30 });
    }

    #[test]
    fn environment_default_has_no_endpoints() {
        let vpc = Vpc::environment_default();
        assert_eq!((vpc.max_azs, vpc.nat_gateways), (2, 2));
        assert!(vpc.gateway_endpoints.is_empty());
        assert_eq!(vpc.private_subnet_ids().len(), 2);
    }
}

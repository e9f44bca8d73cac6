//! Virtual network resources.

use wp_graph::{Declare, Properties, Value};

use super::name_tag;

pub const ANY_IPV4: &str = "0.0.0.0/0";

#[derive(Debug, Clone)]
pub struct Vpc {
    pub cidr_block: String,
    pub name: String,
}

impl Declare for Vpc {
    fn resource_type(&self) -> &'static str {
        "AWS::EC2::VPC"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("CidrBlock", &self.cidr_block)
            .set("EnableDnsHostnames", true)
            .set("EnableDnsSupport", true)
            .set("Tags", name_tag(&self.name))
    }
}

#[derive(Debug, Clone)]
pub struct Subnet {
    pub vpc: Value,
    pub availability_zone: Value,
    pub cidr_block: String,
    pub map_public_ip_on_launch: bool,
    pub name: String,
}

impl Declare for Subnet {
    fn resource_type(&self) -> &'static str {
        "AWS::EC2::Subnet"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("VpcId", self.vpc.clone())
            .set("AvailabilityZone", self.availability_zone.clone())
            .set("CidrBlock", &self.cidr_block)
            .set("MapPublicIpOnLaunch", self.map_public_ip_on_launch)
            .set("Tags", name_tag(&self.name))
    }
}

#[derive(Debug, Clone)]
pub struct InternetGateway {
    pub name: String,
}

impl Declare for InternetGateway {
    fn resource_type(&self) -> &'static str {
        "AWS::EC2::InternetGateway"
    }

    fn properties(&self) -> Properties {
        Properties::new().set("Tags", name_tag(&self.name))
    }
}

#[derive(Debug, Clone)]
pub struct GatewayAttachment {
    pub vpc: Value,
    pub internet_gateway: Value,
}

impl Declare for GatewayAttachment {
    fn resource_type(&self) -> &'static str {
        "AWS::EC2::VPCGatewayAttachment"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("VpcId", self.vpc.clone())
            .set("InternetGatewayId", self.internet_gateway.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ElasticIp {
    pub name: String,
}

impl Declare for ElasticIp {
    fn resource_type(&self) -> &'static str {
        "AWS::EC2::EIP"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("Domain", "vpc")
            .set("Tags", name_tag(&self.name))
    }
}

#[derive(Debug, Clone)]
pub struct NatGateway {
    pub subnet: Value,
    pub allocation_id: Value,
    pub name: String,
}

impl Declare for NatGateway {
    fn resource_type(&self) -> &'static str {
        "AWS::EC2::NatGateway"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("SubnetId", self.subnet.clone())
            .set("AllocationId", self.allocation_id.clone())
            .set("Tags", name_tag(&self.name))
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    pub vpc: Value,
    pub name: String,
}

impl Declare for RouteTable {
    fn resource_type(&self) -> &'static str {
        "AWS::EC2::RouteTable"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("VpcId", self.vpc.clone())
            .set("Tags", name_tag(&self.name))
    }
}

/// Where a default route sends traffic.
#[derive(Debug, Clone)]
pub enum RouteTarget {
    InternetGateway(Value),
    NatGateway(Value),
}

/// Default (`0.0.0.0/0`) route.
#[derive(Debug, Clone)]
pub struct Route {
    pub route_table: Value,
    pub target: RouteTarget,
}

impl Declare for Route {
    fn resource_type(&self) -> &'static str {
        "AWS::EC2::Route"
    }

    fn properties(&self) -> Properties {
        let props = Properties::new()
            .set("RouteTableId", self.route_table.clone())
            .set("DestinationCidrBlock", ANY_IPV4);
        match &self.target {
            RouteTarget::InternetGateway(gateway) => props.set("GatewayId", gateway.clone()),
            RouteTarget::NatGateway(nat) => props.set("NatGatewayId", nat.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubnetRouteTableAssociation {
    pub route_table: Value,
    pub subnet: Value,
}

impl Declare for SubnetRouteTableAssociation {
    fn resource_type(&self) -> &'static str {
        "AWS::EC2::SubnetRouteTableAssociation"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("RouteTableId", self.route_table.clone())
            .set("SubnetId", self.subnet.clone())
    }
}

/// Who may open a connection through an ingress rule.
#[derive(Debug, Clone)]
pub enum IngressSource {
    /// Members of another security group, by its id.
    SecurityGroup(Value),
    Cidr(String),
}

#[derive(Debug, Clone)]
pub struct IngressRule {
    pub port: u16,
    pub source: IngressSource,
    pub description: String,
}

impl IngressRule {
    pub fn from_group(group_id: Value, port: u16, description: impl Into<String>) -> Self {
        Self {
            port,
            source: IngressSource::SecurityGroup(group_id),
            description: description.into(),
        }
    }

    pub fn from_cidr(cidr: impl Into<String>, port: u16, description: impl Into<String>) -> Self {
        Self {
            port,
            source: IngressSource::Cidr(cidr.into()),
            description: description.into(),
        }
    }

    fn render(&self) -> Properties {
        let props = Properties::new()
            .set("IpProtocol", "tcp")
            .set("FromPort", self.port)
            .set("ToPort", self.port)
            .set("Description", &self.description);
        match &self.source {
            IngressSource::SecurityGroup(group) => props.set("SourceSecurityGroupId", group.clone()),
            IngressSource::Cidr(cidr) => props.set("CidrIp", cidr),
        }
    }
}

/// Security group allowing all egress and the listed ingress rules.
#[derive(Debug, Clone)]
pub struct SecurityGroup {
    pub vpc: Value,
    pub group_name: String,
    pub description: String,
    pub ingress: Vec<IngressRule>,
}

impl Declare for SecurityGroup {
    fn resource_type(&self) -> &'static str {
        "AWS::EC2::SecurityGroup"
    }

    fn properties(&self) -> Properties {
        let egress = Properties::new()
            .set("IpProtocol", "-1")
            .set("CidrIp", ANY_IPV4)
            .set("Description", "Allow all outbound traffic by default");

        Properties::new()
            .set("GroupName", &self.group_name)
            .set("GroupDescription", &self.description)
            .set("VpcId", self.vpc.clone())
            .set(
                "SecurityGroupIngress",
                Value::list(self.ingress.iter().map(IngressRule::render)),
            )
            .set("SecurityGroupEgress", Value::list(vec![egress]))
            .set("Tags", name_tag(&self.group_name))
    }
}

/// An ingress rule declared apart from the group it opens.
///
/// Lets a group be created first and opened later by a node that
/// depends on it.
#[derive(Debug, Clone)]
pub struct SecurityGroupIngress {
    pub group: Value,
    pub rule: IngressRule,
}

impl Declare for SecurityGroupIngress {
    fn resource_type(&self) -> &'static str {
        "AWS::EC2::SecurityGroupIngress"
    }

    fn properties(&self) -> Properties {
        self.rule.render().set("GroupId", self.group.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wp_graph::LogicalId;

    #[test]
    fn test_route_target_key() {
        let rt = Value::Ref(LogicalId::new("Rt").unwrap());
        let nat = Route {
            route_table: rt.clone(),
            target: RouteTarget::NatGateway(Value::Ref(LogicalId::new("Nat").unwrap())),
        };
        let props = nat.properties();
        assert!(props.get("NatGatewayId").is_some());
        assert!(props.get("GatewayId").is_none());
        assert_eq!(props.get("DestinationCidrBlock").and_then(Value::as_str), Some(ANY_IPV4));
    }

    #[test]
    fn test_ingress_from_group_has_no_cidr() {
        let group = Value::GetAtt(LogicalId::new("Sg").unwrap(), "GroupId".to_string());
        let ingress = SecurityGroupIngress {
            group: group.clone(),
            rule: IngressRule::from_group(group, 3306, "db"),
        };
        let props = ingress.properties();
        assert!(props.get("SourceSecurityGroupId").is_some());
        assert!(props.get("CidrIp").is_none());
        assert_eq!(props.get("FromPort").and_then(Value::as_int), Some(3306));
    }
}

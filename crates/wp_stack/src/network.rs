//! Network topology: VPC, three subnet tiers, gateways and routing.

use tracing::info;
use wp_config::{NetworkConfig, AZ_COUNT, RESERVED_SUBNET_BLOCKS};
use wp_graph::{cidr, DeclareOptions, Handle, ResourceGraph, Scope, Value};

use crate::error::{StackError, StackResult};
use crate::resources::network::{
    ElasticIp, GatewayAttachment, InternetGateway, NatGateway, Route, RouteTable, RouteTarget,
    Subnet, SubnetRouteTableAssociation, Vpc,
};

/// Subnet tier, each with a fixed range of block indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Routed to the internet gateway.
    Public,
    /// Egress through NAT.
    Private,
    /// No route out of the VPC.
    Isolated,
}

impl Tier {
    pub fn all() -> [Tier; 3] {
        [Tier::Public, Tier::Private, Tier::Isolated]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Public => "public",
            Tier::Private => "private",
            Tier::Isolated => "isolated",
        }
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            Tier::Public => "Public",
            Tier::Private => "Private",
            Tier::Isolated => "Isolated",
        }
    }

    /// Block index of the tier's first subnet. Indices 3, 7 and 11 up to
    /// the reserved limit stay free for growth.
    pub fn first_block(&self) -> u32 {
        match self {
            Tier::Public => 0,
            Tier::Private => 4,
            Tier::Isolated => 8,
        }
    }

    /// Block index of the subnet in availability zone `az`.
    pub fn block_index(&self, az: usize) -> u32 {
        self.first_block() + az as u32
    }
}

/// One declared subnet.
#[derive(Debug, Clone)]
pub struct SubnetRef {
    pub handle: Handle<Subnet>,
    pub availability_zone: usize,
    pub block_index: u32,
    pub cidr: String,
}

/// The subnets of one tier, in availability-zone order.
#[derive(Debug, Clone)]
pub struct SubnetGroup {
    pub tier: Tier,
    pub subnets: Vec<SubnetRef>,
}

impl SubnetGroup {
    /// Subnet ids, ready to pass as a list property.
    pub fn ids(&self) -> Vec<Value> {
        self.subnets.iter().map(|s| s.handle.reference()).collect()
    }

    pub fn len(&self) -> usize {
        self.subnets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subnets.is_empty()
    }

    /// Fail when a builder is handed a group with no subnets.
    pub fn require(&self, consumer: &str) -> StackResult<&Self> {
        if self.subnets.is_empty() {
            return Err(StackError::MissingDependency(format!(
                "{} needs {} subnets",
                consumer,
                self.tier.as_str()
            )));
        }
        Ok(self)
    }
}

/// Everything the network builder declared.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    pub vpc: Handle<Vpc>,
    pub cidr: String,
    pub public: SubnetGroup,
    pub private: SubnetGroup,
    pub isolated: SubnetGroup,
    pub nat_gateways: Vec<Handle<NatGateway>>,
    pub public_route_table: Handle<RouteTable>,
    pub private_route_tables: Vec<Handle<RouteTable>>,
    pub isolated_route_table: Handle<RouteTable>,
    /// Route table index for each private subnet, by availability zone.
    pub private_table_of_subnet: Vec<usize>,
}

impl NetworkGraph {
    pub fn vpc_id(&self) -> Value {
        self.vpc.reference()
    }

    pub fn subnets(&self, tier: Tier) -> &SubnetGroup {
        match tier {
            Tier::Public => &self.public,
            Tier::Private => &self.private,
            Tier::Isolated => &self.isolated,
        }
    }
}

/// Private route table for the subnet in availability zone `az`.
///
/// A single NAT serves every zone through one table; otherwise zone `az`
/// uses table `az % nat_count`.
pub fn private_table_index(az: usize, nat_count: usize) -> usize {
    if nat_count <= 1 {
        0
    } else {
        az % nat_count
    }
}

/// Builds the VPC and its subnet tiers.
pub struct NetworkBuilder {
    prefix: String,
    cidr: String,
    subnet_mask: u8,
    nat_count: u8,
}

impl NetworkBuilder {
    pub fn new(prefix: impl Into<String>, cidr: impl Into<String>, subnet_mask: u8, nat_count: u8) -> Self {
        Self {
            prefix: prefix.into(),
            cidr: cidr.into(),
            subnet_mask,
            nat_count,
        }
    }

    pub fn from_config(prefix: impl Into<String>, config: &NetworkConfig) -> Self {
        Self::new(prefix, config.cidr.clone(), config.subnet_mask, config.nat_count)
    }

    fn check(&self) -> StackResult<()> {
        if self.nat_count == 0 || self.nat_count > AZ_COUNT {
            return Err(StackError::invalid(
                "network.nat_count",
                format!("must be between 1 and {}, got {}", AZ_COUNT, self.nat_count),
            ));
        }
        let blocks = cidr::block_count(&self.cidr, self.subnet_mask)
            .map_err(|e| StackError::invalid("network.cidr", e.to_string()))?;
        if blocks < u64::from(RESERVED_SUBNET_BLOCKS) {
            return Err(StackError::invalid(
                "network.subnet_mask",
                format!(
                    "{} fits only {} /{} blocks, {} are required",
                    self.cidr, blocks, self.subnet_mask, RESERVED_SUBNET_BLOCKS
                ),
            ));
        }
        Ok(())
    }

    fn subnet_group(&self, scope: &mut Scope<'_>, vpc: &Handle<Vpc>, tier: Tier) -> StackResult<SubnetGroup> {
        let mut subnets = Vec::with_capacity(usize::from(AZ_COUNT));
        for az in 0..usize::from(AZ_COUNT) {
            let block_index = tier.block_index(az);
            let block = cidr::select_block(&self.cidr, self.subnet_mask, block_index)?;
            let handle = scope.declare(
                &format!("{}Subnet{}", tier.id_prefix(), az + 1),
                Subnet {
                    vpc: vpc.reference(),
                    availability_zone: Value::availability_zone(az),
                    cidr_block: block.clone(),
                    map_public_ip_on_launch: tier == Tier::Public,
                    name: format!("{}-{}-subnet-{}", self.prefix, tier.as_str(), az + 1),
                },
            )?;
            subnets.push(SubnetRef {
                handle,
                availability_zone: az,
                block_index,
                cidr: block,
            });
        }
        Ok(SubnetGroup { tier, subnets })
    }

    /// Declare the network into `graph`.
    ///
    /// Configuration is checked before anything is declared.
    pub fn build(self, graph: &mut ResourceGraph) -> StackResult<NetworkGraph> {
        self.check()?;
        info!(
            "Building network {} with {} NAT gateway(s)",
            self.cidr, self.nat_count
        );

        let mut scope = graph.scope("Network");
        let vpc = scope.declare(
            "Vpc",
            Vpc {
                cidr_block: self.cidr.clone(),
                name: format!("{}-vpc", self.prefix),
            },
        )?;

        let public = self.subnet_group(&mut scope, &vpc, Tier::Public)?;
        let private = self.subnet_group(&mut scope, &vpc, Tier::Private)?;
        let isolated = self.subnet_group(&mut scope, &vpc, Tier::Isolated)?;

        // Public routing
        let igw = scope.declare(
            "InternetGateway",
            InternetGateway {
                name: format!("{}-igw", self.prefix),
            },
        )?;
        let attachment = scope.declare(
            "GatewayAttachment",
            GatewayAttachment {
                vpc: vpc.reference(),
                internet_gateway: igw.reference(),
            },
        )?;
        let public_route_table = scope.declare(
            "PublicRouteTable",
            RouteTable {
                vpc: vpc.reference(),
                name: format!("{}-public-rt", self.prefix),
            },
        )?;
        scope.declare_with(
            "PublicDefaultRoute",
            Route {
                route_table: public_route_table.reference(),
                target: RouteTarget::InternetGateway(igw.reference()),
            },
            DeclareOptions::new().depends_on(&attachment),
        )?;
        for subnet in &public.subnets {
            scope.declare(
                &format!("PublicSubnet{}RouteTableAssociation", subnet.availability_zone + 1),
                SubnetRouteTableAssociation {
                    route_table: public_route_table.reference(),
                    subnet: subnet.handle.reference(),
                },
            )?;
        }

        // NAT gateways in the first `nat_count` public subnets
        let nat_count = usize::from(self.nat_count);
        let mut nat_gateways = Vec::with_capacity(nat_count);
        for subnet in public.subnets.iter().take(nat_count) {
            let n = subnet.availability_zone + 1;
            let eip = scope.declare_with(
                &format!("NatEip{}", n),
                ElasticIp {
                    name: format!("{}-nat-eip-{}", self.prefix, n),
                },
                DeclareOptions::new().depends_on(&attachment),
            )?;
            let nat = scope.declare(
                &format!("NatGateway{}", n),
                NatGateway {
                    subnet: subnet.handle.reference(),
                    allocation_id: eip.attr("AllocationId"),
                    name: format!("{}-nat-{}", self.prefix, n),
                },
            )?;
            nat_gateways.push(nat);
        }

        // Private routing: one table per NAT
        let mut private_route_tables = Vec::with_capacity(nat_count);
        for (i, nat) in nat_gateways.iter().enumerate() {
            let (id, name) = if nat_count == 1 {
                ("PrivateRouteTable".to_string(), format!("{}-private-rt", self.prefix))
            } else {
                (
                    format!("PrivateRouteTable{}", i + 1),
                    format!("{}-private-rt-{}", self.prefix, i + 1),
                )
            };
            let table = scope.declare(
                &id,
                RouteTable {
                    vpc: vpc.reference(),
                    name,
                },
            )?;
            scope.declare(
                &format!("{}DefaultRoute", id),
                Route {
                    route_table: table.reference(),
                    target: RouteTarget::NatGateway(nat.reference()),
                },
            )?;
            private_route_tables.push(table);
        }

        let mut private_table_of_subnet = Vec::with_capacity(private.len());
        for subnet in &private.subnets {
            let index = private_table_index(subnet.availability_zone, nat_count);
            let table = private_route_tables.get(index).ok_or_else(|| {
                StackError::MissingDependency(format!("private route table {}", index + 1))
            })?;
            scope.declare(
                &format!("PrivateSubnet{}RouteTableAssociation", subnet.availability_zone + 1),
                SubnetRouteTableAssociation {
                    route_table: table.reference(),
                    subnet: subnet.handle.reference(),
                },
            )?;
            private_table_of_subnet.push(index);
        }

        // Isolated routing: local only
        let isolated_route_table = scope.declare(
            "IsolatedRouteTable",
            RouteTable {
                vpc: vpc.reference(),
                name: format!("{}-isolated-rt", self.prefix),
            },
        )?;
        for subnet in &isolated.subnets {
            scope.declare(
                &format!("IsolatedSubnet{}RouteTableAssociation", subnet.availability_zone + 1),
                SubnetRouteTableAssociation {
                    route_table: isolated_route_table.reference(),
                    subnet: subnet.handle.reference(),
                },
            )?;
        }

        scope.output("VpcId", vpc.reference(), Some(format!("{}-vpc-id", self.prefix)))?;

        Ok(NetworkGraph {
            vpc,
            cidr: self.cidr,
            public,
            private,
            isolated,
            nat_gateways,
            public_route_table,
            private_route_tables,
            isolated_route_table,
            private_table_of_subnet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(nat_count: u8) -> (ResourceGraph, NetworkGraph) {
        let mut graph = ResourceGraph::new("network");
        let network = NetworkBuilder::new("dev-exprj", "10.230.0.0/16", 24, nat_count)
            .build(&mut graph)
            .unwrap();
        (graph, network)
    }

    #[test]
    fn test_tier_block_indices() {
        let (_, network) = build(1);
        let indices = |group: &SubnetGroup| group.subnets.iter().map(|s| s.block_index).collect::<Vec<_>>();
        assert_eq!(indices(&network.public), vec![0, 1, 2]);
        assert_eq!(indices(&network.private), vec![4, 5, 6]);
        assert_eq!(indices(&network.isolated), vec![8, 9, 10]);
        assert_eq!(network.private.subnets[0].cidr, "10.230.4.0/24");
        assert_eq!(network.isolated.subnets[2].cidr, "10.230.10.0/24");
    }

    #[test]
    fn test_single_nat_shares_one_table() {
        let (graph, network) = build(1);
        assert_eq!(network.nat_gateways.len(), 1);
        assert_eq!(network.private_route_tables.len(), 1);
        assert_eq!(network.private_table_of_subnet, vec![0, 0, 0]);
        assert!(graph.contains(&wp_graph::LogicalId::new("NetworkPrivateRouteTable").unwrap()));
    }

    #[test]
    fn test_table_per_nat() {
        let (_, network) = build(3);
        assert_eq!(network.nat_gateways.len(), 3);
        assert_eq!(network.private_route_tables.len(), 3);
        assert_eq!(network.private_table_of_subnet, vec![0, 1, 2]);

        let (_, network) = build(2);
        assert_eq!(network.private_route_tables.len(), 2);
        assert_eq!(network.private_table_of_subnet, vec![0, 1, 0]);
    }

    #[test]
    fn test_nat_placed_in_public_subnets() {
        let (graph, network) = build(2);
        for (nat, subnet) in network.nat_gateways.iter().zip(&network.public.subnets) {
            let node = graph.node(nat.identifier()).unwrap();
            assert_eq!(node.property("SubnetId"), Some(&subnet.handle.reference()));
        }
    }

    #[test]
    fn test_rejects_bad_nat_count() {
        for nat_count in [0, 4] {
            let mut graph = ResourceGraph::new("network");
            let err = NetworkBuilder::new("p", "10.0.0.0/16", 24, nat_count)
                .build(&mut graph)
                .unwrap_err();
            assert!(err.is_validation());
            assert!(graph.is_empty());
        }
    }

    #[test]
    fn test_rejects_range_without_reserved_blocks() {
        let mut graph = ResourceGraph::new("network");
        let err = NetworkBuilder::new("p", "10.0.0.0/22", 24, 1)
            .build(&mut graph)
            .unwrap_err();
        assert!(matches!(err, StackError::InvalidConfig { ref field, .. } if field == "network.subnet_mask"));
    }

    #[test]
    fn test_private_table_index() {
        assert_eq!(private_table_index(2, 1), 0);
        assert_eq!(private_table_index(2, 2), 0);
        assert_eq!(private_table_index(1, 3), 1);
    }
}

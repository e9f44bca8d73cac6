//! Fixed-size block selection inside a network range.

use ipnet::Ipv4Net;

use crate::error::{GraphError, GraphResult};

fn parse(cidr: &str) -> GraphResult<Ipv4Net> {
    cidr.parse::<Ipv4Net>()
        .map(|net| net.trunc())
        .map_err(|e| GraphError::InvalidCidr {
            cidr: cidr.to_string(),
            message: e.to_string(),
        })
}

/// Number of `/mask` blocks that fit in `cidr`.
pub fn block_count(cidr: &str, mask: u8) -> GraphResult<u64> {
    let net = parse(cidr)?;
    if mask < net.prefix_len() || mask > 32 {
        return Err(GraphError::InvalidCidr {
            cidr: cidr.to_string(),
            message: format!("/{} blocks do not fit", mask),
        });
    }
    Ok(1u64 << (mask - net.prefix_len()))
}

/// The `index`-th block of size `2^(32 - mask)` inside `cidr`.
///
/// Block numbering starts at the network address, so the same input
/// always yields the same block.
pub fn select_block(cidr: &str, mask: u8, index: u32) -> GraphResult<String> {
    let net = parse(cidr)?;
    let count = block_count(cidr, mask)?;
    if u64::from(index) >= count {
        return Err(GraphError::InvalidCidr {
            cidr: cidr.to_string(),
            message: format!("block {} is past the {} available /{} blocks", index, count, mask),
        });
    }

    net.subnets(mask)
        .ok()
        .and_then(|mut blocks| blocks.nth(index as usize))
        .map(|block| block.to_string())
        .ok_or_else(|| GraphError::InvalidCidr {
            cidr: cidr.to_string(),
            message: format!("block {} could not be derived", index),
        })
}

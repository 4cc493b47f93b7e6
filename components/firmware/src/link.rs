//  _____       ______   ____
// |_   _|     |  ____|/ ____|  Institute of Embedded Systems
//   | |  _ __ | |__  | (___    Zurich University of Applied Sciences
//   | | | '_ \|  __|  \___ \   8401 Winterthur, Switzerland
//  _| |_| | | | |____ ____) |
// |_____|_| |_|______|_____/
//
// Copyright 2025 Institute of Embedded Systems at Zurich University of Applied Sciences.
// All rights reserved.
// SPDX-License-Identifier: MIT

//! Link header in front of every LoRa payload
//!
//! LoRa has no addressing, so the header carries `source`, `destination` (0xff is broadcast) and
//! the little-endian `channel`.

use heapless::Vec;

use dual_motes::{Channel, DualMotesInput, Frame, NodeId, WireError, MAX_FRAME_SIZE};
use experiment_api::{Destination, Input};

pub const LINK_HEADER_SIZE: usize = 4;
pub const MAX_LINK_FRAME_SIZE: usize = LINK_HEADER_SIZE + MAX_FRAME_SIZE;

const BROADCAST_ADDRESS: NodeId = 0xff;

pub type LinkFrame = Vec<u8, MAX_LINK_FRAME_SIZE>;

pub fn encode(
    source: NodeId,
    destination: Destination<NodeId>,
    channel: Channel,
    frame: &Frame,
) -> Result<LinkFrame, WireError> {
    let destination = match destination {
        Destination::Unicast(node) => node,
        Destination::Broadcast => BROADCAST_ADDRESS,
    };
    let [channel_low, channel_high] = channel.to_le_bytes();
    let mut link_frame = LinkFrame::new();
    link_frame
        .extend_from_slice(&[source, destination, channel_low, channel_high])
        .and_then(|()| link_frame.extend_from_slice(frame))
        .map_err(|()| WireError::FrameTooLarge {
            size: LINK_HEADER_SIZE + frame.len(),
        })?;
    Ok(link_frame)
}

/// Returns the packet if it is meant for `node`
pub fn decode(link_frame: &[u8], node: NodeId, link_timestamp: u16) -> Option<DualMotesInput> {
    let (header, payload) = link_frame.split_at_checked(LINK_HEADER_SIZE)?;
    let (source, destination) = (header[0], header[1]);
    if destination != node && destination != BROADCAST_ADDRESS {
        return None;
    }
    Some(Input::Packet {
        source,
        channel: Channel::from_le_bytes([header[2], header[3]]),
        frame: Frame::from_slice(payload).ok()?,
        link_timestamp,
    })
}

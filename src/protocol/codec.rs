//! `tokio_util` codec adapters
//!
//! The station speaks in whole websocket messages, so the frame decoder treats
//! the source buffer as exactly one message: an empty buffer means nothing to
//! do, anything else is decoded and consumed in full.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::Error;
use super::command::{Command, CommandEncoder};
use super::frame::{DecodedFrame, FrameDecoder};

impl Decoder for FrameDecoder {
    type Item = DecodedFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let message = src.split();
        FrameDecoder::decode(self, &message).map(Some)
    }
}

impl Encoder<Command> for CommandEncoder {
    type Error = Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_into(&item, dst)
    }
}

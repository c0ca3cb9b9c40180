//! Generic On/Off server and client models.
use crate::access::{ModelIdentifier, Opcode};
use crate::address::{Address, UnicastAddress};
use crate::mesh::ModelId;
use crate::models::{Model, ModelConfig, Outbound};
use crate::router::KeyHandle;
use slog::{debug, info, warn, Logger};

pub const GENERIC_ONOFF_SERVER: ModelId = ModelId(0x1000);
pub const GENERIC_ONOFF_CLIENT: ModelId = ModelId(0x1001);

pub const GENERIC_ONOFF_GET: Opcode = Opcode(0x8201);
pub const GENERIC_ONOFF_SET: Opcode = Opcode(0x8202);
pub const GENERIC_ONOFF_SET_UNACKNOWLEDGED: Opcode = Opcode(0x8203);
pub const GENERIC_ONOFF_STATUS: Opcode = Opcode(0x8204);

fn status_payload(state: bool) -> Vec<u8> {
    GENERIC_ONOFF_STATUS.with_parameters(&[state as u8])
}

/// Holds a single boolean state and answers GET/SET with STATUS.
pub struct OnOffServer {
    config: ModelConfig,
    state: bool,
    log: Logger,
}
impl OnOffServer {
    #[must_use]
    pub fn new(log: Logger) -> OnOffServer {
        OnOffServer {
            config: ModelConfig::default(),
            state: false,
            log,
        }
    }
    #[must_use]
    pub fn state(&self) -> bool {
        self.state
    }
    fn reply(&self, source: UnicastAddress, key: KeyHandle) -> Vec<Outbound> {
        match key {
            KeyHandle::App(app_index) => vec![Outbound {
                destination: Address::Unicast(source),
                app_index,
                payload: status_payload(self.state),
            }],
            KeyHandle::Device => {
                // On/Off messages are application-key bound; nothing to
                // answer a device-key message with.
                warn!(self.log, "onoff request with device key ignored");
                Vec::new()
            }
        }
    }
}
impl Model for OnOffServer {
    fn identifier(&self) -> ModelIdentifier {
        ModelIdentifier::new_sig(GENERIC_ONOFF_SERVER)
    }
    fn config(&self) -> &ModelConfig {
        &self.config
    }
    fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }
    fn process_message(
        &mut self,
        source: UnicastAddress,
        _destination: &Address,
        key: KeyHandle,
        payload: &[u8],
    ) -> Vec<Outbound> {
        let (opcode, parameters) = match Opcode::split(payload) {
            Some(split) => split,
            None => return Vec::new(),
        };
        match opcode {
            GENERIC_ONOFF_GET => self.reply(source, key),
            GENERIC_ONOFF_SET => {
                if let Some(state) = parameters.first() {
                    self.state = *state != 0;
                    info!(self.log, "onoff set"; "state" => self.state);
                }
                self.reply(source, key)
            }
            GENERIC_ONOFF_SET_UNACKNOWLEDGED => {
                if let Some(state) = parameters.first() {
                    self.state = *state != 0;
                    info!(self.log, "onoff set unacknowledged"; "state" => self.state);
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
    fn publish_payload(&mut self) -> Result<Option<Vec<u8>>, crate::models::ModelError> {
        Ok(Some(status_payload(self.state)))
    }
}

/// Sends On/Off requests and reports received STATUS messages.
pub struct OnOffClient {
    config: ModelConfig,
    log: Logger,
}
impl OnOffClient {
    #[must_use]
    pub fn new(log: Logger) -> OnOffClient {
        OnOffClient {
            config: ModelConfig::default(),
            log,
        }
    }
    #[must_use]
    pub fn get_message() -> Vec<u8> {
        GENERIC_ONOFF_GET.with_parameters(&[])
    }
    #[must_use]
    pub fn set_message(on: bool, acknowledged: bool) -> Vec<u8> {
        let opcode = if acknowledged {
            GENERIC_ONOFF_SET
        } else {
            GENERIC_ONOFF_SET_UNACKNOWLEDGED
        };
        opcode.with_parameters(&[on as u8])
    }
}
impl Model for OnOffClient {
    fn identifier(&self) -> ModelIdentifier {
        ModelIdentifier::new_sig(GENERIC_ONOFF_CLIENT)
    }
    fn config(&self) -> &ModelConfig {
        &self.config
    }
    fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }
    fn process_message(
        &mut self,
        source: UnicastAddress,
        _destination: &Address,
        _key: KeyHandle,
        payload: &[u8],
    ) -> Vec<Outbound> {
        match Opcode::split(payload) {
            Some((GENERIC_ONOFF_STATUS, parameters)) => {
                match parameters.first() {
                    Some(0) => info!(self.log, "onoff status"; "source" => %u16::from(source), "state" => "OFF"),
                    Some(_) => info!(self.log, "onoff status"; "source" => %u16::from(source), "state" => "ON"),
                    None => info!(self.log, "onoff status"; "source" => %u16::from(source), "state" => "UNKNOWN"),
                }
            }
            _ => debug!(self.log, "onoff client ignoring message"),
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::AppKeyIndex;
    use slog::o;

    fn log() -> Logger {
        Logger::root(slog::Discard, o!())
    }
    fn src() -> UnicastAddress {
        UnicastAddress::new(0x0042)
    }

    #[test]
    fn test_get_replies_with_status() {
        let mut server = OnOffServer::new(log());
        let replies = server.process_message(
            src(),
            &Address::Unicast(UnicastAddress::new(0x0001)),
            KeyHandle::App(AppKeyIndex(3)),
            &OnOffClient::get_message(),
        );
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].destination, Address::Unicast(src()));
        assert_eq!(replies[0].app_index, AppKeyIndex(3));
        assert_eq!(replies[0].payload, status_payload(false));
    }
    #[test]
    fn test_set_unacknowledged_is_silent() {
        let mut server = OnOffServer::new(log());
        let replies = server.process_message(
            src(),
            &Address::Group(crate::address::GroupAddress::all_nodes()),
            KeyHandle::App(AppKeyIndex(0)),
            &OnOffClient::set_message(true, false),
        );
        assert!(replies.is_empty());
        assert!(server.state());
    }
    #[test]
    fn test_set_flips_state_and_replies() {
        let mut server = OnOffServer::new(log());
        let replies = server.process_message(
            src(),
            &Address::Unicast(UnicastAddress::new(0x0001)),
            KeyHandle::App(AppKeyIndex(0)),
            &OnOffClient::set_message(true, true),
        );
        assert!(server.state());
        assert_eq!(replies[0].payload, status_payload(true));
    }
    #[test]
    fn test_short_payload_ignored() {
        let mut server = OnOffServer::new(log());
        assert!(server
            .process_message(
                src(),
                &Address::Unassigned,
                KeyHandle::App(AppKeyIndex(0)),
                &[0x82],
            )
            .is_empty());
    }
}

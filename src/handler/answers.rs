//! Built-in answer builders for the base command set.
//!
//! Every answer starts from the same generic construction: hop-by-hop and
//! end-to-end ids echoed from the request, Origin-Host/Origin-Realm set to
//! the local identity and Destination-Host/Destination-Realm set to the
//! peer's declared origin. The per-command builders then append their
//! Result-Code and command-specific AVPs.

use crate::error::{DiameterError, Result};
use crate::handler::{CommandHandler, PeerContext};
use crate::protocol::constants::{avp_code, result_code};
use crate::protocol::{AvpValue, Message};

/// Build the generic answer skeleton for a request.
///
/// Destination-Host/Destination-Realm are taken from the request's
/// Origin-Host/Origin-Realm and skipped when the request does not declare
/// them, so the generic error answer can be produced for any parseable
/// request.
pub fn generic_answer(request: &Message, ctx: &PeerContext) -> Result<Message> {
    let dict = ctx.dictionary.as_ref();
    let mut answer = Message::answer_to(request);

    answer.add("Origin-Host", ctx.origin_host.as_str(), dict)?;
    answer.add("Origin-Realm", ctx.origin_realm.as_str(), dict)?;

    if let Some(host) = request.get("Origin-Host", dict).and_then(AvpValue::as_utf8) {
        let host = host.to_string();
        answer.add("Destination-Host", host, dict)?;
    }
    if let Some(realm) = request.get("Origin-Realm", dict).and_then(AvpValue::as_utf8) {
        let realm = realm.to_string();
        answer.add("Destination-Realm", realm, dict)?;
    }

    Ok(answer)
}

/// Handler for Capability-Exchange requests (CER -> CEA).
pub struct CapabilityExchange;

impl CommandHandler for CapabilityExchange {
    fn build_answer(&self, request: &Message, ctx: &PeerContext) -> Result<Message> {
        let dict = ctx.dictionary.as_ref();
        for required in ["Origin-Host", "Origin-Realm"] {
            if request.get(required, dict).is_none() {
                return Err(DiameterError::MissingAvp(required.to_string()));
            }
        }

        let mut answer = generic_answer(request, ctx)?;
        answer.add("Result-Code", result_code::DIAMETER_SUCCESS, dict)?;

        // Re-emit every request AVP except the origin pair, grouped values
        // included child by child.
        for avp in &request.avps {
            let is_origin = avp.vendor_id.is_none()
                && (avp.code == avp_code::ORIGIN_HOST || avp.code == avp_code::ORIGIN_REALM);
            if !is_origin {
                answer.push(avp.clone());
            }
        }

        Ok(answer)
    }

    // The capability exchange is what establishes the connection.
    fn requires_established(&self) -> bool {
        false
    }
}

/// Handler for Device-Watchdog requests (DWR -> DWA).
pub struct DeviceWatchdog;

impl CommandHandler for DeviceWatchdog {
    fn build_answer(&self, request: &Message, ctx: &PeerContext) -> Result<Message> {
        let dict = ctx.dictionary.as_ref();
        let state_id = request
            .get("Origin-State-Id", dict)
            .cloned()
            .ok_or_else(|| DiameterError::MissingAvp("Origin-State-Id".to_string()))?;

        let mut answer = generic_answer(request, ctx)?;
        answer.add("Result-Code", result_code::DIAMETER_SUCCESS, dict)?;
        answer.add("Origin-State-Id", state_id, dict)?;
        Ok(answer)
    }
}

/// Default handler: answers any unsupported or failed command with
/// `DIAMETER_UNABLE_TO_COMPLY`.
pub struct UnableToComply;

impl CommandHandler for UnableToComply {
    fn build_answer(&self, request: &Message, ctx: &PeerContext) -> Result<Message> {
        let mut answer = generic_answer(request, ctx)?;
        answer.add(
            "Result-Code",
            result_code::DIAMETER_UNABLE_TO_COMPLY,
            ctx.dictionary.as_ref(),
        )?;
        Ok(answer)
    }

    fn requires_established(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use crate::protocol::constants::command;
    use std::sync::Arc;

    fn ctx() -> PeerContext {
        PeerContext::new("server.asn.test", "asn.test", Arc::new(Dictionary::base()))
    }

    fn cer(origin_host: &str, origin_realm: &str) -> Message {
        let dict = Dictionary::base();
        let mut request = Message::request(command::CAPABILITY_EXCHANGE, 0);
        request.header.hop_by_hop_id = 0x1234;
        request.header.end_to_end_id = 0x5678;
        request.add("Origin-Host", origin_host, &dict).unwrap();
        request.add("Origin-Realm", origin_realm, &dict).unwrap();
        request
    }

    #[test]
    fn test_capability_exchange_answer() {
        let ctx = ctx();
        let dict = ctx.dictionary.clone();
        let request = cer("client.test", "test");

        let answer = CapabilityExchange.build_answer(&request, &ctx).unwrap();

        assert!(!answer.is_request());
        assert_eq!(answer.hop_by_hop_id(), 0x1234);
        assert_eq!(answer.end_to_end_id(), 0x5678);
        assert_eq!(
            answer.get("Origin-Host", &dict).and_then(AvpValue::as_utf8),
            Some("server.asn.test")
        );
        assert_eq!(
            answer
                .get("Destination-Host", &dict)
                .and_then(AvpValue::as_utf8),
            Some("client.test")
        );
        assert_eq!(
            answer
                .get("Destination-Realm", &dict)
                .and_then(AvpValue::as_utf8),
            Some("test")
        );
        assert_eq!(
            answer
                .get("Result-Code", &dict)
                .and_then(AvpValue::as_unsigned32),
            Some(result_code::DIAMETER_SUCCESS)
        );
    }

    #[test]
    fn test_capability_exchange_echoes_extra_avps_but_not_origin() {
        let ctx = ctx();
        let dict = ctx.dictionary.clone();
        let mut request = cer("client.test", "test");
        request.add("Vendor-Id", 10415u32, &dict).unwrap();
        request.add("Product-Name", "peer.product", &dict).unwrap();

        let answer = CapabilityExchange.build_answer(&request, &ctx).unwrap();

        assert_eq!(
            answer
                .get("Vendor-Id", &dict)
                .and_then(AvpValue::as_unsigned32),
            Some(10415)
        );
        assert_eq!(
            answer
                .get("Product-Name", &dict)
                .and_then(AvpValue::as_utf8),
            Some("peer.product")
        );
        // The request's origin pair must not be echoed back; the answer's
        // own origin is the local identity.
        let origins: Vec<_> = answer
            .avps
            .iter()
            .filter(|avp| avp.code == avp_code::ORIGIN_HOST)
            .collect();
        assert_eq!(origins.len(), 1);
        assert_eq!(
            origins[0].value.as_utf8(),
            Some("server.asn.test")
        );
    }

    #[test]
    fn test_capability_exchange_echoes_grouped_avp() {
        let ctx = ctx();
        let dict = ctx.dictionary.clone();
        let mut request = cer("client.test", "test");
        let children = vec![
            crate::protocol::Avp::new("Vendor-Id", 10415u32, &dict).unwrap(),
            crate::protocol::Avp::new("Auth-Application-Id", 5u32, &dict).unwrap(),
        ];
        request
            .add("Vendor-Specific-Application-Id", children.clone(), &dict)
            .unwrap();

        let answer = CapabilityExchange.build_answer(&request, &ctx).unwrap();

        let grouped = answer
            .get("Vendor-Specific-Application-Id", &dict)
            .and_then(AvpValue::as_grouped)
            .unwrap();
        assert_eq!(grouped, &children[..]);
    }

    #[test]
    fn test_capability_exchange_requires_origin() {
        let ctx = ctx();
        let request = Message::request(command::CAPABILITY_EXCHANGE, 0);
        let result = CapabilityExchange.build_answer(&request, &ctx);
        assert!(matches!(result, Err(DiameterError::MissingAvp(_))));
    }

    #[test]
    fn test_device_watchdog_echoes_origin_state_id() {
        let ctx = ctx();
        let dict = ctx.dictionary.clone();
        let mut request = Message::request(command::DEVICE_WATCHDOG, 0);
        request.add("Origin-Host", "client.test", &dict).unwrap();
        request.add("Origin-Realm", "test", &dict).unwrap();
        request.add("Origin-State-Id", 42u32, &dict).unwrap();

        let answer = DeviceWatchdog.build_answer(&request, &ctx).unwrap();

        assert_eq!(
            answer
                .get("Origin-State-Id", &dict)
                .and_then(AvpValue::as_unsigned32),
            Some(42)
        );
        assert_eq!(
            answer
                .get("Result-Code", &dict)
                .and_then(AvpValue::as_unsigned32),
            Some(result_code::DIAMETER_SUCCESS)
        );
    }

    #[test]
    fn test_device_watchdog_without_state_id_fails() {
        let ctx = ctx();
        let dict = ctx.dictionary.clone();
        let mut request = Message::request(command::DEVICE_WATCHDOG, 0);
        request.add("Origin-Host", "client.test", &dict).unwrap();

        let result = DeviceWatchdog.build_answer(&request, &ctx);
        assert!(matches!(result, Err(DiameterError::MissingAvp(_))));
    }

    #[test]
    fn test_unable_to_comply_answer() {
        let ctx = ctx();
        let dict = ctx.dictionary.clone();
        let mut request = Message::request(999, 0);
        request.add("Origin-Host", "client.test", &dict).unwrap();
        request.add("Origin-Realm", "test", &dict).unwrap();

        let answer = UnableToComply.build_answer(&request, &ctx).unwrap();

        assert_eq!(answer.command_code(), 999);
        assert_eq!(
            answer
                .get("Result-Code", &dict)
                .and_then(AvpValue::as_unsigned32),
            Some(result_code::DIAMETER_UNABLE_TO_COMPLY)
        );
    }

    #[test]
    fn test_unable_to_comply_tolerates_missing_origin() {
        let ctx = ctx();
        let dict = ctx.dictionary.clone();
        let request = Message::request(999, 0);

        let answer = UnableToComply.build_answer(&request, &ctx).unwrap();
        assert!(answer.get("Destination-Host", &dict).is_none());
        assert!(answer.get("Result-Code", &dict).is_some());
    }
}

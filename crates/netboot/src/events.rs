//! Relays reports from booting and installed machines to the inventory.
//!
//! Bodies are decoded and checked here; the inventory only ever sees
//! well-formed events attributed to the hardware the request resolved to.

use crate::error::BootError;
use crate::job::{Job, bounded};
use inventory_client::InventoryClientTrait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const PROVISIONING_PREFIX: &str = "provisioning.";

/// A phone-home callback body
#[derive(Debug, Clone, PartialEq)]
pub enum PhoneHome {
    /// Install progress: `{"type": "provisioning.<code>", "body": ...}`
    Event { kind: String, body: Value },
    /// Instance boot announcement: `{"instance_id": "<uuid>"}`
    Instance { instance_id: Uuid },
}

impl PhoneHome {
    /// Decode a JSON body, or an iPXE `params` form post when `content_type`
    /// says so.
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> Result<Self, BootError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(BootError::Malformed("phone-home body is empty".to_string()));
        }

        let value = if content_type.is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded")) {
            parse_form(body)?
        } else {
            serde_json::from_slice::<Value>(body)
                .map_err(|e| BootError::Malformed(format!("phone-home body is not JSON: {}", e)))?
        };

        if let Some(kind) = value.get("type").and_then(Value::as_str) {
            if !kind.starts_with(PROVISIONING_PREFIX) {
                return Err(BootError::Malformed(format!("invalid phone-home event type {:?}", kind)));
            }
            return Ok(PhoneHome::Event {
                kind: kind.to_string(),
                body: value.get("body").cloned().unwrap_or(Value::Null),
            });
        }

        if let Some(id) = value.get("instance_id").and_then(Value::as_str) {
            let instance_id = Uuid::parse_str(id)
                .map_err(|e| BootError::Malformed(format!("invalid phone-home instance id {:?}: {}", id, e)))?;
            return Ok(PhoneHome::Instance { instance_id });
        }

        Err(BootError::Malformed("phone-home body has neither type nor instance_id".to_string()))
    }
}

/// `a=1&b=two+words` into a JSON object of strings.
fn parse_form(body: &[u8]) -> Result<Value, BootError> {
    let text = std::str::from_utf8(body).map_err(|e| BootError::Malformed(format!("form body is not UTF-8: {}", e)))?;
    let mut fields = serde_json::Map::new();
    for pair in text.trim().split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        fields.insert(decode_form_component(key)?, Value::String(decode_form_component(value)?));
    }
    Ok(Value::Object(fields))
}

fn decode_form_component(raw: &str) -> Result<String, BootError> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|s| s.into_owned())
        .map_err(|e| BootError::Malformed(format!("invalid form encoding in {:?}: {}", raw, e)))
}

/// A custom event sent by software running on an instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserEvent {
    pub code: i64,
    pub state: String,
    pub message: String,
}

impl UserEvent {
    pub fn parse(body: &[u8]) -> Result<Self, BootError> {
        if body.is_empty() {
            return Err(BootError::Malformed("user event body is empty".to_string()));
        }
        // `null` is an event with every field unset
        serde_json::from_slice::<Option<Self>>(body)
            .map(Option::unwrap_or_default)
            .map_err(|e| BootError::Malformed(format!("user event cannot be generated from supplied json: {}", e)))
    }

    /// The instance event posted to the inventory
    pub fn to_instance_event(&self) -> Value {
        json!({
            "type": format!("user.{}", self.code),
            "state": self.state,
            "body": self.message,
        })
    }
}

/// Forwards phone-homes, events, problems and component reports
pub struct EventForwarder {
    inventory: Arc<dyn InventoryClientTrait>,
    timeout: Duration,
}

impl std::fmt::Debug for EventForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventForwarder")
            .field("inventory", &self.inventory.base_url())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EventForwarder {
    pub fn new(inventory: Arc<dyn InventoryClientTrait>, timeout: Duration) -> Self {
        Self { inventory, timeout }
    }

    /// Relay a phone-home for `job`.
    ///
    /// Phone-homes that cannot be attributed to the job's instance are
    /// dropped with a log line; they are not errors.
    pub async fn phone_home(&self, job: &Job, phone_home: &PhoneHome) -> Result<(), BootError> {
        let Some(instance_id) = job.instance_id() else {
            info!(hardware_id = %job.hardware_id(), "Phone-home from hardware without an instance, not relaying");
            return Ok(());
        };

        match phone_home {
            PhoneHome::Event { kind, body } => {
                let event = json!({"type": kind, "body": body});
                let id = bounded(self.timeout, self.inventory.post_instance_event(instance_id, &event)).await?;
                debug!("Relayed {} for instance {} as event {}", kind, instance_id, id);
            }
            PhoneHome::Instance { instance_id: claimed } => {
                if !Uuid::parse_str(instance_id).is_ok_and(|id| id == *claimed) {
                    warn!(
                        hardware_id = %job.hardware_id(),
                        claimed = %claimed,
                        instance_id = %instance_id,
                        "Phone-home instance id does not match the hardware's instance, not relaying"
                    );
                    return Ok(());
                }
                bounded(self.timeout, self.inventory.post_instance_phone_home(instance_id)).await?;
                debug!("Relayed phone-home for instance {}", instance_id);
            }
        }
        Ok(())
    }

    /// Relay a user event to `instance_id`, returning the event id.
    pub async fn user_event(&self, instance_id: &str, body: &[u8]) -> Result<String, BootError> {
        let event = UserEvent::parse(body)?;
        bounded(
            self.timeout,
            self.inventory.post_instance_event(instance_id, &event.to_instance_event()),
        )
        .await
    }

    /// Relay a problem report; the body must name a non-empty `problem`.
    pub async fn problem(&self, job: &Job, body: &[u8]) -> Result<(), BootError> {
        let report: Value = serde_json::from_slice(body)
            .map_err(|e| BootError::Malformed(format!("problem body is not JSON: {}", e)))?;
        match report.get("problem").and_then(Value::as_str) {
            Some(problem) if !problem.is_empty() => {
                info!(hardware_id = %job.hardware_id(), problem = %problem, "Hardware problem reported");
            }
            _ => return Err(BootError::Malformed("problem body must name a problem".to_string())),
        }
        bounded(self.timeout, self.inventory.post_hardware_problem(job.hardware_id(), &report)).await
    }

    /// Relay a hardware component report, returning the inventory's reply.
    pub async fn hardware_components(&self, job: &Job, body: &[u8]) -> Result<Value, BootError> {
        let components: Value = serde_json::from_slice(body)
            .map_err(|e| BootError::Malformed(format!("hardware components body is not JSON: {}", e)))?;
        bounded(
            self.timeout,
            self.inventory.post_hardware_components(job.hardware_id(), &components),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{INSTANCE_ID, MockJob};
    use inventory_client::MockInventoryClient;

    const FORM: Option<&str> = Some("application/x-www-form-urlencoded");

    fn forwarder(mock: &MockInventoryClient) -> EventForwarder {
        EventForwarder::new(Arc::new(mock.clone()), Duration::from_secs(1))
    }

    #[test]
    fn test_parse_json_phone_home() {
        let event = PhoneHome::parse(None, br#"{"type":"provisioning.109","body":"done"}"#).unwrap();
        assert_eq!(
            event,
            PhoneHome::Event {
                kind: "provisioning.109".to_string(),
                body: json!("done"),
            }
        );

        let body = format!(r#"{{"instance_id": "{}"}}"#, INSTANCE_ID);
        let event = PhoneHome::parse(Some("application/json"), body.as_bytes()).unwrap();
        assert_eq!(
            event,
            PhoneHome::Instance {
                instance_id: Uuid::parse_str(INSTANCE_ID).unwrap()
            }
        );
    }

    #[test]
    fn test_parse_ipxe_form_post() {
        let body = b"body=Device+connected+to+DHCP+system&type=provisioning.104.01";
        let event = PhoneHome::parse(FORM, body).unwrap();
        assert_eq!(
            event,
            PhoneHome::Event {
                kind: "provisioning.104.01".to_string(),
                body: json!("Device connected to DHCP system"),
            }
        );

        let event = PhoneHome::parse(FORM, b"type=provisioning.106&body=a%2Fb").unwrap();
        assert!(matches!(event, PhoneHome::Event { body, .. } if body == json!("a/b")));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let cases: [(Option<&str>, &[u8]); 7] = [
            (None, b""),
            (None, b"  \n"),
            (None, b"{not json"),
            (None, br#"{"type":"user.1"}"#),
            (None, br#"{"instance_id":"not-a-uuid"}"#),
            (None, br#"{"something":"else"}"#),
            (FORM, b"body=only"),
        ];
        for (content_type, body) in cases {
            let err = PhoneHome::parse(content_type, body).unwrap_err();
            assert!(
                matches!(err, BootError::Malformed(_)),
                "{:?} gave {}",
                String::from_utf8_lossy(body),
                err
            );
        }
    }

    #[test]
    fn test_user_event_payload() {
        let event = UserEvent::parse(br#"{"code": 1004, "state": "succeeded", "message": "hi"}"#).unwrap();
        assert_eq!(
            event.to_instance_event(),
            json!({"type": "user.1004", "state": "succeeded", "body": "hi"})
        );
        assert!(matches!(UserEvent::parse(b""), Err(BootError::Malformed(_))));
        assert!(matches!(UserEvent::parse(br#"{"code": "x"}"#), Err(BootError::Malformed(_))));
    }

    #[test]
    fn test_null_user_event_is_code_zero() {
        let event = UserEvent::parse(b"null").unwrap();
        assert_eq!(event, UserEvent::default());
        assert_eq!(event.to_instance_event(), json!({"type": "user.0", "state": "", "body": ""}));
    }

    #[tokio::test]
    async fn test_phone_home_relays_to_instance() {
        let mock = MockInventoryClient::new("http://inventory.test");
        let forwarder = forwarder(&mock);
        let job = MockJob::new("c3.small.x86", "ewr1").job();

        let event = PhoneHome::parse(None, br#"{"type":"provisioning.109"}"#).unwrap();
        forwarder.phone_home(&job, &event).await.unwrap();
        // Repeating is harmless
        forwarder.phone_home(&job, &event).await.unwrap();
        assert_eq!(mock.events().len(), 2);
        assert_eq!(mock.events()[0], (INSTANCE_ID.to_string(), json!({"type": "provisioning.109", "body": null})));

        let instance = PhoneHome::Instance {
            instance_id: Uuid::parse_str(INSTANCE_ID).unwrap(),
        };
        forwarder.phone_home(&job, &instance).await.unwrap();
        assert_eq!(mock.phone_homes(), vec![INSTANCE_ID.to_string()]);
    }

    #[tokio::test]
    async fn test_phone_home_for_other_instance_is_dropped() {
        let mock = MockInventoryClient::new("http://inventory.test");
        let job = MockJob::new("c3.small.x86", "ewr1").job();
        let other = PhoneHome::Instance { instance_id: Uuid::nil() };
        forwarder(&mock).phone_home(&job, &other).await.unwrap();
        assert!(mock.phone_homes().is_empty());

        let job = MockJob::new("c3.small.x86", "ewr1").without_instance().job();
        let event = PhoneHome::parse(None, br#"{"type":"provisioning.109"}"#).unwrap();
        forwarder(&mock).phone_home(&job, &event).await.unwrap();
        assert!(mock.events().is_empty());
    }

    #[tokio::test]
    async fn test_problem_requires_problem_field() {
        let mock = MockInventoryClient::new("http://inventory.test");
        let forwarder = forwarder(&mock);
        let job = MockJob::new("c3.small.x86", "ewr1").job();

        let bodies: [&[u8]; 3] = [b"{}", br#"{"problem": ""}"#, b"nope"];
        for body in bodies {
            let err = forwarder.problem(&job, body).await.unwrap_err();
            assert!(matches!(err, BootError::Malformed(_)));
        }

        forwarder.problem(&job, br#"{"problem": "disk", "detail": "sda"}"#).await.unwrap();
        assert_eq!(
            mock.problems(),
            vec![("hw-fake".to_string(), json!({"problem": "disk", "detail": "sda"}))]
        );
    }

    #[tokio::test]
    async fn test_backend_failure_is_unavailable() {
        let mock = MockInventoryClient::new("http://inventory.test");
        mock.set_unavailable(true);
        let job = MockJob::new("c3.small.x86", "ewr1").job();
        let err = forwarder(&mock)
            .hardware_components(&job, br#"{"disks": []}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, BootError::Unavailable(_)));
    }
}

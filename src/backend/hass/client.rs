use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::model::entity::Area;
use crate::model::hass::{HassEntityMetadata, HassState, HassStateChangedEvent};
use crate::translate::ServiceCall;

/// Lists `entity_id|area_id;area_name|label_id;label_name,label_id;label_name,`
/// for every light and switch.
const METADATA_TEMPLATE: &str = r"
{% for s in states if s.entity_id.startswith('light.') or s.entity_id.startswith('switch.') %}
{{ s.entity_id }}|{{ area_id(s.entity_id) or '' }};{{ area_name(s.entity_id) or '' }}|{% for l in labels(s.entity_id) %}{{ l }};{{ label_name(l) }},{% endfor %}
{% endfor %}
";

#[derive(Debug, Deserialize)]
struct HassWsEventEnvelope {
    #[serde(default)]
    pub event_type: String,
    pub data: HassWsEventData,
}

#[derive(Debug, Deserialize)]
struct HassWsEventData {
    pub entity_id: String,
    pub new_state: Option<HassState>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum HassWsIncoming {
    #[serde(rename = "auth_required")]
    AuthRequired,
    #[serde(rename = "auth_ok")]
    AuthOk,
    #[serde(rename = "auth_invalid")]
    AuthInvalid,
    #[serde(rename = "result")]
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        error: Option<Value>,
    },
    #[serde(rename = "event")]
    Event { event: HassWsEventEnvelope },
    #[serde(other)]
    Other,
}

pub struct HassWs {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl HassWs {
    async fn recv_json(&mut self) -> ApiResult<Option<HassWsIncoming>> {
        let Some(msg) = self.socket.next().await else {
            return Ok(None);
        };
        let Message::Text(text) = msg? else {
            return Ok(Some(HassWsIncoming::Other));
        };
        Ok(Some(serde_json::from_str::<HassWsIncoming>(&text)?))
    }

    /// Wait for the next `state_changed` event. `None` means the connection
    /// was closed.
    pub async fn next_state_changed(&mut self) -> ApiResult<Option<HassStateChangedEvent>> {
        while let Some(msg) = self.recv_json().await? {
            if let HassWsIncoming::Event { event } = msg {
                if event.event_type == "state_changed" {
                    return Ok(Some(HassStateChangedEvent {
                        entity_id: event.data.entity_id,
                        new_state: event.data.new_state,
                    }));
                }
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Serialize)]
struct HassTemplateRequest<'a> {
    template: &'a str,
}

pub struct HassClient {
    base_url: Url,
    http: reqwest::Client,
    token: String,
    timeout: Duration,
}

impl HassClient {
    pub fn new(base_url: Url, token: &str, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            http,
            token: token.trim().to_string(),
            timeout,
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> ApiResult<Url> {
        let base = if self.base_url.path().ends_with('/') {
            self.base_url.clone()
        } else {
            Url::parse(&format!("{}/", self.base_url))?
        };
        Ok(base.join(endpoint.trim_start_matches('/'))?)
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        action: &str,
    ) -> ApiResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let details = if body.is_empty() {
            format!("{status}")
        } else {
            format!("{status}: {body}")
        };

        let err = if status == StatusCode::UNAUTHORIZED {
            format!("Home Assistant unauthorized during {action}. Verify HASS_TOKEN")
        } else {
            format!("Home Assistant error during {action}: {details}")
        };

        Err(ApiError::BackendError(err))
    }

    /// All entity states. Entries that do not look like entity states are
    /// skipped.
    pub async fn get_states(&self) -> ApiResult<Vec<HassState>> {
        let url = self.endpoint_url("/api/states")?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = self.check_status(response, "GET /api/states").await?;

        let states: Vec<Value> = response.json().await?;

        Ok(states
            .into_iter()
            .filter_map(|value| {
                serde_json::from_value(value)
                    .inspect_err(|err| log::debug!("Skipping malformed entity state: {err}"))
                    .ok()
            })
            .collect())
    }

    /// Labels and area per entity id.
    pub async fn get_entity_metadata(&self) -> ApiResult<HashMap<String, HassEntityMetadata>> {
        let url = self.endpoint_url("/api/template")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&HassTemplateRequest {
                template: METADATA_TEMPLATE,
            })
            .send()
            .await?;
        let response = self
            .check_status(response, "POST /api/template (entity metadata)")
            .await?;

        Ok(parse_metadata(&response.text().await?))
    }

    pub async fn call_service(&self, call: &ServiceCall) -> ApiResult<()> {
        let url = self.endpoint_url(&format!("/api/services/{}/{}", call.domain, call.service))?;

        let mut data = call.data.clone();
        data.insert(
            "entity_id".to_string(),
            Value::String(call.entity_id.clone()),
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&Value::Object(data))
            .send()
            .await?;
        self.check_status(
            response,
            &format!("POST /api/services/{}/{}", call.domain, call.service),
        )
        .await?;
        Ok(())
    }

    fn ws_endpoint_url(&self) -> ApiResult<Url> {
        let mut url = self.endpoint_url("/api/websocket")?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|()| {
            ApiError::service_error("Failed to convert Home Assistant url scheme for websocket")
        })?;
        Ok(url)
    }

    /// Connect to the websocket api, authenticate and subscribe to
    /// `state_changed` events. The whole handshake is bounded by the client
    /// timeout.
    pub async fn subscribe_state_changed(&self) -> ApiResult<HassWs> {
        tokio::time::timeout(self.timeout, self.connect_and_subscribe())
            .await
            .map_err(|_| ApiError::BackendTimeout(self.timeout))?
    }

    async fn connect_and_subscribe(&self) -> ApiResult<HassWs> {
        let ws_url = self.ws_endpoint_url()?;
        let (mut socket, _response) = connect_async(ws_url.as_str()).await?;

        let greeting = match socket.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<HassWsIncoming>(&text).ok(),
            Some(Err(err)) => return Err(err.into()),
            Some(Ok(_)) | None => None,
        };
        if !matches!(greeting, Some(HassWsIncoming::AuthRequired)) {
            return Err(ApiError::BackendError(
                "Home Assistant websocket did not ask for authentication".to_string(),
            ));
        }

        let auth = serde_json::json!({
            "type": "auth",
            "access_token": self.token,
        });
        socket.send(Message::Text(auth.to_string().into())).await?;

        loop {
            let Some(msg) = socket.next().await else {
                return Err(ApiError::BackendError(
                    "Home Assistant websocket closed during auth".to_string(),
                ));
            };
            if let Message::Text(text) = msg? {
                match serde_json::from_str::<HassWsIncoming>(&text)? {
                    HassWsIncoming::AuthOk => break,
                    HassWsIncoming::AuthInvalid => {
                        return Err(ApiError::BackendError(
                            "Home Assistant websocket auth failed (check token)".to_string(),
                        ));
                    }
                    _ => {}
                }
            }
        }

        let sub = serde_json::json!({
            "id": 1,
            "type": "subscribe_events",
            "event_type": "state_changed",
        });
        socket.send(Message::Text(sub.to_string().into())).await?;

        loop {
            let Some(msg) = socket.next().await else {
                return Err(ApiError::BackendError(
                    "Home Assistant websocket closed during subscribe".to_string(),
                ));
            };
            if let Message::Text(text) = msg? {
                let reply = serde_json::from_str::<HassWsIncoming>(&text)?;
                if let HassWsIncoming::Result { id: 1, success, error } = reply {
                    if success {
                        break;
                    }
                    return Err(ApiError::BackendError(format!(
                        "Home Assistant subscribe_events failed: {}",
                        error.unwrap_or(Value::Null)
                    )));
                }
            }
        }

        Ok(HassWs { socket })
    }
}

fn parse_labels(labels: &str) -> BTreeSet<String> {
    labels
        .split([',', ';'])
        .map(|label| label.trim().to_lowercase())
        .filter(|label| !label.is_empty())
        .collect()
}

fn parse_area(area: &str) -> Option<Area> {
    let (id, name) = area.split_once(';').unwrap_or((area, ""));
    let id = id.trim();
    if id.is_empty() {
        return None;
    }

    let name = name.trim();
    Some(Area {
        id: id.to_string(),
        name: if name.is_empty() { id } else { name }.to_string(),
    })
}

/// Parse the output of [`METADATA_TEMPLATE`]. Lines that do not start with
/// an entity id are skipped.
fn parse_metadata(body: &str) -> HashMap<String, HassEntityMetadata> {
    let mut map = HashMap::new();

    for line in body.lines().map(str::trim).filter(|x| !x.is_empty()) {
        let mut fields = line.splitn(3, '|');
        let (Some(entity_id), Some(area), labels) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let entity_id = entity_id.trim();
        if entity_id.is_empty() {
            continue;
        }

        let meta = HassEntityMetadata {
            labels: labels.map(parse_labels).unwrap_or_default(),
            area: parse_area(area),
        };

        if meta != HassEntityMetadata::default() {
            map.insert(entity_id.to_string(), meta);
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::SinkExt;
    use maplit::btreeset;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;
    use url::Url;

    use crate::backend::hass::client::{HassClient, parse_metadata};
    use crate::error::ApiError;
    use crate::model::entity::Area;

    fn client(url: &str) -> HassClient {
        HassClient::new(Url::parse(url).unwrap(), " token\n", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn endpoint_urls() {
        let c = client("http://ha.local:8123");
        assert_eq!(
            c.endpoint_url("/api/states").unwrap().as_str(),
            "http://ha.local:8123/api/states"
        );
        assert_eq!(c.token, "token");

        let c = client("https://example.com/hass");
        assert_eq!(
            c.endpoint_url("/api/states").unwrap().as_str(),
            "https://example.com/hass/api/states"
        );
        assert_eq!(
            c.ws_endpoint_url().unwrap().as_str(),
            "wss://example.com/hass/api/websocket"
        );
    }

    #[test]
    fn metadata_from_template_output() {
        let body = "\n\nlight.kitchen|kitchen;Kitchen|kitchen;Kitchen,evening;Evening Lights,\nswitch.fan|;|\n\nlight.desk|;|office_2;Office,\nlight.hall|hallway;|\ngarbage\n";
        let meta = parse_metadata(body);

        assert_eq!(meta.len(), 3);
        assert_eq!(
            meta["light.kitchen"].labels,
            btreeset! {"kitchen".to_string(), "evening".to_string(), "evening lights".to_string()}
        );
        assert_eq!(
            meta["light.kitchen"].area,
            Some(Area {
                id: "kitchen".into(),
                name: "Kitchen".into()
            })
        );
        assert_eq!(
            meta["light.desk"].labels,
            btreeset! {"office_2".to_string(), "office".to_string()}
        );
        assert_eq!(meta["light.desk"].area, None);
        assert_eq!(meta["light.hall"].area.as_ref().unwrap().name, "hallway");
        assert!(meta["light.hall"].labels.is_empty());
        assert!(!meta.contains_key("switch.fan"));
    }

    #[tokio::test]
    async fn silent_server_times_out_websocket_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // accept, then never answer
        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(sock);
        });

        let c = HassClient::new(
            Url::parse(&format!("http://{addr}")).unwrap(),
            "token",
            Duration::from_millis(200),
        )
        .unwrap();

        let res = c.subscribe_state_changed().await;
        assert!(matches!(res, Err(ApiError::BackendTimeout(_))));
        server.abort();
    }

    #[tokio::test]
    async fn websocket_must_ask_for_auth_first() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(sock).await.unwrap();
            ws.send(Message::Text(r#"{"type": "auth_ok"}"#.into()))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let c = HassClient::new(
            Url::parse(&format!("http://{addr}")).unwrap(),
            "token",
            Duration::from_secs(5),
        )
        .unwrap();

        let res = c.subscribe_state_changed().await;
        assert!(matches!(res, Err(ApiError::BackendError(_))));
        server.abort();
    }
}

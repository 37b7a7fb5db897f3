use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use uuid::Uuid;

use super::{ActionAgent, AgentRequest, AgentResult, Interpretation, Interpreter, ServiceClient, ServiceError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InterpretRequest {
    image_base64: String,
    user_id: Uuid,
}

pub struct HttpInterpreter {
    client: ServiceClient,
}

impl HttpInterpreter {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Interpreter for HttpInterpreter {
    async fn interpret(&self, image: &[u8], user_id: Uuid) -> Result<Interpretation, ServiceError> {
        let body = InterpretRequest {
            image_base64: STANDARD.encode(image),
            user_id,
        };
        self.client.post_json("/v1/interpret", &body).await
    }
}

pub struct HttpActionAgent {
    client: ServiceClient,
}

impl HttpActionAgent {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionAgent for HttpActionAgent {
    async fn execute(&self, request: AgentRequest<'_>) -> Result<AgentResult, ServiceError> {
        self.client.post_json("/v1/execute", &request).await
    }
}

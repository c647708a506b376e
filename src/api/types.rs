use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

/// Validation strategy Microcks applies when running a contract test.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestRunnerType {
    #[default]
    Http,
    SoapHttp,
    SoapUi,
    Postman,
    OpenApiSchema,
    AsyncApiSchema,
    GrpcProtobuf,
    GraphqlSchema,
}

impl TestRunnerType {
    /// Runners that record only the first failing step of a test case.
    pub fn is_recording_style(&self) -> bool {
        matches!(
            self,
            TestRunnerType::Http
                | TestRunnerType::SoapHttp
                | TestRunnerType::SoapUi
                | TestRunnerType::Postman
        )
    }
}

impl std::fmt::Display for TestRunnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestRunnerType::Http => "HTTP",
            TestRunnerType::SoapHttp => "SOAP_HTTP",
            TestRunnerType::SoapUi => "SOAP_UI",
            TestRunnerType::Postman => "POSTMAN",
            TestRunnerType::OpenApiSchema => "OPEN_API_SCHEMA",
            TestRunnerType::AsyncApiSchema => "ASYNC_API_SCHEMA",
            TestRunnerType::GrpcProtobuf => "GRPC_PROTOBUF",
            TestRunnerType::GraphqlSchema => "GRAPHQL_SCHEMA",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OAuth2GrantType {
    Password,
    ClientCredentials,
    RefreshToken,
}

/// A header override. `values` is comma-joined here and a JSON array on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Header {
    pub name: String,
    #[serde(
        serialize_with = "serialize_comma_joined",
        deserialize_with = "deserialize_comma_joined",
        default
    )]
    pub values: String,
}

impl Header {
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values.join(","),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

fn serialize_comma_joined<S: Serializer>(values: &str, serializer: S) -> Result<S::Ok, S::Error> {
    let parts: Vec<&str> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    parts.serialize(serializer)
}

fn deserialize_comma_joined<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Values {
        List(Vec<String>),
        Joined(String),
    }
    Ok(match Option::<Values>::deserialize(deserializer)? {
        Some(Values::List(list)) => list.join(","),
        Some(Values::Joined(s)) => s,
        None => String::new(),
    })
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = Option::<u64>::deserialize(deserializer)?.unwrap_or(0);
        Ok(Duration::from_millis(millis))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2ClientContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<OAuth2GrantType>,
}

impl OAuth2ClientContext {
    pub fn builder() -> OAuth2ClientContextBuilder {
        OAuth2ClientContextBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct OAuth2ClientContextBuilder {
    context: OAuth2ClientContext,
}

impl OAuth2ClientContextBuilder {
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.context.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.context.client_secret = Some(client_secret.into());
        self
    }

    pub fn token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.context.token_uri = Some(token_uri.into());
        self
    }

    pub fn scopes(mut self, scopes: impl Into<String>) -> Self {
        self.context.scopes = Some(scopes.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.context.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.context.password = Some(password.into());
        self
    }

    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.context.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn grant_type(mut self, grant_type: OAuth2GrantType) -> Self {
        self.context.grant_type = Some(grant_type);
        self
    }

    pub fn build(self) -> OAuth2ClientContext {
        self.context
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2AuthorizedClient {
    pub principal_name: Option<String>,
    pub token_uri: Option<String>,
    pub scopes: Option<String>,
    pub grant_type: Option<OAuth2GrantType>,
}

/// Input of a contract test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    /// `"{name}:{version}"` key of the service under test.
    pub service_id: String,
    pub runner_type: TestRunnerType,
    pub test_endpoint: String,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_operations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations_headers: Option<BTreeMap<String, Vec<Header>>>,
    #[serde(rename = "oAuth2Context", skip_serializing_if = "Option::is_none")]
    pub oauth2_context: Option<OAuth2ClientContext>,
}

impl TestRequest {
    pub fn builder(
        service_id: impl Into<String>,
        runner_type: TestRunnerType,
        test_endpoint: impl Into<String>,
    ) -> TestRequestBuilder {
        TestRequestBuilder {
            request: TestRequest {
                service_id: service_id.into(),
                runner_type,
                test_endpoint: test_endpoint.into(),
                timeout: Duration::from_secs(2),
                filtered_operations: None,
                operations_headers: None,
                oauth2_context: None,
            },
        }
    }
}

#[derive(Debug)]
pub struct TestRequestBuilder {
    request: TestRequest,
}

impl TestRequestBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = timeout;
        self
    }

    pub fn filtered_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.filtered_operations = Some(operations.into_iter().map(Into::into).collect());
        self
    }

    pub fn operation_headers(mut self, operation: impl Into<String>, headers: Vec<Header>) -> Self {
        self.request
            .operations_headers
            .get_or_insert_with(BTreeMap::new)
            .insert(operation.into(), headers);
        self
    }

    pub fn oauth2_context(mut self, context: OAuth2ClientContext) -> Self {
        self.request.oauth2_context = Some(context);
        self
    }

    pub fn build(self) -> TestRequest {
        self.request
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestStepResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub elapsed_time: u64,
    pub request_name: Option<String>,
    pub event_message_name: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub elapsed_time: u64,
    pub operation_name: Option<String>,
    #[serde(default)]
    pub test_step_results: Vec<TestStepResult>,
}

impl TestCaseResult {
    /// First failing step; for recording-style runners this explains the case.
    pub fn first_failure(&self) -> Option<&TestStepResult> {
        self.test_step_results.iter().find(|s| !s.success)
    }
}

/// Server-assigned test run, refreshed by polling until `in_progress` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub test_number: u32,
    #[serde(default)]
    pub test_date: i64,
    pub tested_endpoint: Option<String>,
    pub service_id: Option<String>,
    #[serde(with = "duration_millis", default)]
    pub timeout: Duration,
    #[serde(default)]
    pub elapsed_time: u64,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub runner_type: TestRunnerType,
    #[serde(default)]
    pub test_case_results: Vec<TestCaseResult>,
    pub operations_headers: Option<BTreeMap<String, Vec<Header>>>,
    pub authorized_client: Option<OAuth2AuthorizedClient>,
}

impl TestResult {
    pub fn test_case(&self, operation_name: &str) -> Option<&TestCaseResult> {
        self.test_case_results
            .iter()
            .find(|c| c.operation_name.as_deref() == Some(operation_name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Parameter {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: Option<String>,
    pub name: Option<String>,
    pub content: Option<String>,
    pub operation_id: Option<String>,
    pub test_case_id: Option<String>,
    pub source_artifact: Option<String>,
    pub headers: Option<Vec<Header>>,
    pub query_parameters: Option<Vec<Parameter>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: Option<String>,
    pub name: Option<String>,
    pub content: Option<String>,
    pub operation_id: Option<String>,
    pub test_case_id: Option<String>,
    pub source_artifact: Option<String>,
    pub headers: Option<Vec<Header>>,
    pub status: Option<String>,
    pub media_type: Option<String>,
    pub dispatch_criteria: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RequestResponsePair {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub request: Option<Request>,
    pub response: Option<Response>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub id: Option<String>,
    pub name: Option<String>,
    pub content: Option<String>,
    pub operation_id: Option<String>,
    pub test_case_id: Option<String>,
    pub source_artifact: Option<String>,
    pub headers: Option<Vec<Header>>,
    pub media_type: Option<String>,
    pub dispatch_criteria: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UnidirectionalEvent {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub event_message: Option<EventMessage>,
}

/// Per-day invocation metrics of one service version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DailyInvocationStatistic {
    pub id: Option<String>,
    pub day: Option<String>,
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    #[serde(default)]
    pub daily_count: f64,
    pub hourly_count: Option<BTreeMap<String, f64>>,
    pub minute_count: Option<BTreeMap<String, f64>>,
}

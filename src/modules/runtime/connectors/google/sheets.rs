//! Google Sheets connector over the Sheets v4 and Drive v3 APIs
//!
//! Sheets are treated as tables: the first row holds the column names and
//! every later row becomes one result row keyed by those names.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{ConnectionResult, Options, ResourceType, Row, RuntimeResult, ValidateResult};
use tracing::debug;

use super::ServiceAccount;
use crate::connectors::common::{
    flexible_u64, http_client, json_or_string, json_response, transport_error, value_to_rows,
};
use crate::connectors::traits::{decode_action, decode_resource, require_action, require_resource, Connector};

const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
const VALUE_INPUT: (&str, &str) = ("valueInputOption", "USER_ENTERED");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum AuthMode {
    ServiceAccount,
    Oauth2,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthOpts {
    #[serde(default)]
    private_key: Value,
    #[serde(default)]
    access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SheetsOptions {
    authentication: AuthMode,
    #[serde(default)]
    opts: AuthOpts,
}

impl SheetsOptions {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        match opts.authentication {
            AuthMode::ServiceAccount => {
                ServiceAccount::parse(&opts.opts.private_key)?;
            }
            AuthMode::Oauth2 => require_resource(&opts.opts.access_token, "opts.accessToken")?,
        }
        Ok(opts)
    }

    async fn access_token(&self, client: &reqwest::Client) -> Result<String, SwitchyardError> {
        match self.authentication {
            AuthMode::ServiceAccount => {
                ServiceAccount::parse(&self.opts.private_key)?
                    .access_token(client, SCOPES)
                    .await
            }
            AuthMode::Oauth2 => Ok(self.opts.access_token.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RangeType {
    #[default]
    Limit,
    A1,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetOpts {
    #[serde(default)]
    spreadsheet: String,
    #[serde(default)]
    sheet_name: String,
    #[serde(default)]
    range_type: RangeType,
    #[serde(default)]
    a1_notation: String,
    #[serde(default, deserialize_with = "flexible_u64")]
    limit: Option<u64>,
    #[serde(default, deserialize_with = "flexible_u64")]
    offset: Option<u64>,
    #[serde(default, deserialize_with = "json_or_string")]
    values: Option<Value>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    to_spreadsheet: String,
    /// 1-based data row (the header row is not counted)
    #[serde(default, deserialize_with = "flexible_u64")]
    row_index: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Method {
    Read,
    Append,
    Update,
    Create,
    Copy,
    Delete,
    List,
    Info,
}

#[derive(Debug, Clone, Deserialize)]
struct SheetsAction {
    method: Method,
    #[serde(default)]
    opts: SheetOpts,
}

impl SheetsAction {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let action: Self = decode_action(options)?;
        let opts = &action.opts;
        match action.method {
            Method::List => {}
            Method::Create => require_action(&opts.title, "opts.title")?,
            Method::Info => require_action(&opts.spreadsheet, "opts.spreadsheet")?,
            Method::Read | Method::Append | Method::Update | Method::Delete | Method::Copy => {
                require_action(&opts.spreadsheet, "opts.spreadsheet")?;
                require_action(&opts.sheet_name, "opts.sheetName")?;
            }
        }
        match action.method {
            Method::Read if opts.range_type == RangeType::A1 => {
                require_action(&opts.a1_notation, "opts.a1Notation")?
            }
            Method::Update => require_action(&opts.a1_notation, "opts.a1Notation")?,
            Method::Copy => require_action(&opts.to_spreadsheet, "opts.toSpreadsheet")?,
            Method::Delete if opts.row_index.unwrap_or(0) == 0 => {
                return Err(SwitchyardError::InvalidAction(
                    "opts.rowIndex must be a positive row number".to_string(),
                ))
            }
            _ => {}
        }
        if matches!(action.method, Method::Append | Method::Update)
            && !matches!(opts.values, Some(Value::Array(_)))
        {
            return Err(SwitchyardError::InvalidAction(
                "opts.values must be a list of rows".to_string(),
            ));
        }
        Ok(action)
    }
}

/// Drive query matching spreadsheets only
fn spreadsheet_filter() -> String {
    format!("mimeType='{}'", SPREADSHEET_MIME)
}

/// `'Sheet Name'` with embedded quotes doubled
fn quote_sheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Turn a value grid into rows using `header` as column names
fn grid_to_rows(header: &[String], grid: &[Value]) -> Vec<Row> {
    grid.iter()
        .map(|line| {
            let cells = line.as_array().map(Vec::as_slice).unwrap_or(&[]);
            header
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let cell = cells.get(i).cloned().unwrap_or(Value::String(String::new()));
                    (name.clone(), cell)
                })
                .collect()
        })
        .collect()
}

/// Lay out input rows as cell arrays; objects are ordered by `header`
fn rows_to_grid(header: &[String], rows: &[Value]) -> Vec<Value> {
    rows.iter()
        .map(|row| match row {
            Value::Object(map) => Value::Array(
                header
                    .iter()
                    .map(|name| Value::String(map.get(name).map(cell_text).unwrap_or_default()))
                    .collect(),
            ),
            Value::Array(cells) => Value::Array(cells.iter().map(|c| Value::String(cell_text(c))).collect()),
            other => Value::Array(vec![Value::String(cell_text(other))]),
        })
        .collect()
}

/// Authenticated session for one operation
struct SheetsSession<'a> {
    client: reqwest::Client,
    token: String,
    config: &'a RuntimeConfig,
}

impl<'a> SheetsSession<'a> {
    async fn open(opts: &SheetsOptions, config: &'a RuntimeConfig) -> Result<Self, SwitchyardError> {
        let client = http_client(config)?;
        let token = opts.access_token(&client).await?;
        Ok(Self { client, token, config })
    }

    fn sheets_url(&self, path: &str) -> String {
        format!("{}/spreadsheets{}", self.config.endpoints.google_sheets().trim_end_matches('/'), path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, SwitchyardError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error("Google Sheets", e))?;
        json_response("Google Sheets", response).await
    }

    async fn values(&self, spreadsheet: &str, range: &str) -> Result<Vec<Value>, SwitchyardError> {
        let url = self.sheets_url(&format!(
            "/{}/values/{}",
            urlencoding::encode(spreadsheet),
            urlencoding::encode(range)
        ));
        let body = self.send(self.client.get(url)).await?;
        Ok(body
            .get("values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn header(&self, spreadsheet: &str, sheet: &str) -> Result<Vec<String>, SwitchyardError> {
        let grid = self
            .values(spreadsheet, &format!("{}!1:1", quote_sheet(sheet)))
            .await?;
        Ok(grid
            .first()
            .and_then(Value::as_array)
            .map(|cells| cells.iter().map(cell_text).collect())
            .unwrap_or_default())
    }

    /// Numeric sheet id of a named tab
    async fn sheet_id(&self, spreadsheet: &str, sheet: &str) -> Result<i64, SwitchyardError> {
        let info = self
            .send(
                self.client
                    .get(self.sheets_url(&format!("/{}", urlencoding::encode(spreadsheet))))
                    .query(&[("fields", "sheets.properties")]),
            )
            .await?;
        info.get("sheets")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|s| s.get("properties"))
            .find(|p| p.get("title").and_then(Value::as_str) == Some(sheet))
            .and_then(|p| p.get("sheetId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| SwitchyardError::OperationFailed(format!("sheet '{}' not found", sheet)))
    }

    async fn read(&self, opts: &SheetOpts) -> Result<Vec<Row>, SwitchyardError> {
        match opts.range_type {
            RangeType::Limit => {
                let grid = self.values(&opts.spreadsheet, &quote_sheet(&opts.sheet_name)).await?;
                let Some((header, data)) = grid.split_first() else {
                    return Ok(Vec::new());
                };
                let header: Vec<String> = header
                    .as_array()
                    .map(|cells| cells.iter().map(cell_text).collect())
                    .unwrap_or_default();
                let offset = opts.offset.unwrap_or(0) as usize;
                let data = data.get(offset..).unwrap_or(&[]);
                let data = match opts.limit.filter(|l| *l > 0) {
                    Some(limit) => &data[..data.len().min(limit as usize)],
                    None => data,
                };
                Ok(grid_to_rows(&header, data))
            }
            RangeType::A1 => {
                let header = self.header(&opts.spreadsheet, &opts.sheet_name).await?;
                let range = format!("{}!{}", quote_sheet(&opts.sheet_name), opts.a1_notation);
                let grid = self.values(&opts.spreadsheet, &range).await?;
                Ok(grid_to_rows(&header, &grid))
            }
        }
    }

    async fn write(&self, method: Method, opts: &SheetOpts) -> Result<Vec<Row>, SwitchyardError> {
        let header = self.header(&opts.spreadsheet, &opts.sheet_name).await?;
        let input = opts.values.as_ref().and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
        let body = json!({ "values": rows_to_grid(&header, input) });
        let spreadsheet = urlencoding::encode(&opts.spreadsheet);

        let request = if method == Method::Append {
            let range = urlencoding::encode(&quote_sheet(&opts.sheet_name)).into_owned();
            self.client
                .post(self.sheets_url(&format!("/{}/values/{}:append", spreadsheet, range)))
                .query(&[VALUE_INPUT])
                .json(&body)
        } else {
            let range = format!("{}!{}", quote_sheet(&opts.sheet_name), opts.a1_notation);
            self.client
                .put(self.sheets_url(&format!(
                    "/{}/values/{}",
                    spreadsheet,
                    urlencoding::encode(&range)
                )))
                .query(&[VALUE_INPUT])
                .json(&body)
        };
        let response = self.send(request).await?;
        let summary = response.get("updates").cloned().unwrap_or(response);
        Ok(value_to_rows(summary))
    }
}

/// Google Sheets connector
pub struct GoogleSheetsConnector {
    config: Arc<RuntimeConfig>,
}

impl GoogleSheetsConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for GoogleSheetsConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::GoogleSheets
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        SheetsOptions::decode(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        SheetsAction::decode(options)?;
        Ok(ValidateResult::valid())
    }

    /// Mints a token and lists one spreadsheet
    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let opts = SheetsOptions::decode(options)?;
        let session = SheetsSession::open(&opts, &self.config).await?;
        let filter = spreadsheet_filter();
        session
            .send(
                session
                    .client
                    .get(format!("{}/files", self.config.endpoints.google_drive()))
                    .query(&[("pageSize", "1"), ("q", filter.as_str())]),
            )
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(e.to_string()))?;
        Ok(ConnectionResult::success())
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let opts = SheetsOptions::decode(resource_options)?;
        let action = SheetsAction::decode(action_options)?;
        let session = SheetsSession::open(&opts, &self.config).await?;
        let args = &action.opts;

        debug!(method = ?action.method, "Google Sheets request");
        let rows = match action.method {
            Method::Read => session.read(args).await?,
            Method::Append | Method::Update => session.write(action.method, args).await?,
            Method::Create => {
                let created = session
                    .send(
                        session
                            .client
                            .post(session.sheets_url(""))
                            .json(&json!({"properties": {"title": args.title}})),
                    )
                    .await?;
                let mut row = Row::new();
                for key in ["spreadsheetId", "spreadsheetUrl"] {
                    row.insert(key.to_string(), created.get(key).cloned().unwrap_or(Value::Null));
                }
                vec![row]
            }
            Method::Copy => {
                let sheet_id = session.sheet_id(&args.spreadsheet, &args.sheet_name).await?;
                let copied = session
                    .send(
                        session
                            .client
                            .post(session.sheets_url(&format!(
                                "/{}/sheets/{}:copyTo",
                                urlencoding::encode(&args.spreadsheet),
                                sheet_id
                            )))
                            .json(&json!({"destinationSpreadsheetId": args.to_spreadsheet})),
                    )
                    .await?;
                value_to_rows(copied)
            }
            Method::Delete => {
                let sheet_id = session.sheet_id(&args.spreadsheet, &args.sheet_name).await?;
                // Data row N lives at zero-based grid index N (row 0 is the header)
                let index = args.row_index.unwrap_or(1);
                session
                    .send(
                        session
                            .client
                            .post(session.sheets_url(&format!(
                                "/{}:batchUpdate",
                                urlencoding::encode(&args.spreadsheet)
                            )))
                            .json(&json!({"requests": [{"deleteDimension": {"range": {
                                "sheetId": sheet_id,
                                "dimension": "ROWS",
                                "startIndex": index,
                                "endIndex": index + 1
                            }}}]})),
                    )
                    .await?;
                Vec::new()
            }
            Method::List => {
                let filter = spreadsheet_filter();
                let listed = session
                    .send(
                        session
                            .client
                            .get(format!("{}/files", self.config.endpoints.google_drive()))
                            .query(&[
                                ("q", filter.as_str()),
                                ("fields", "files(id,name)"),
                            ]),
                    )
                    .await?;
                listed
                    .get("files")
                    .cloned()
                    .map(value_to_rows)
                    .unwrap_or_default()
            }
            Method::Info => {
                let info = session
                    .send(
                        session
                            .client
                            .get(session.sheets_url(&format!(
                                "/{}",
                                urlencoding::encode(&args.spreadsheet)
                            )))
                            .query(&[("fields", "spreadsheetId,properties.title,sheets.properties.title")]),
                    )
                    .await?;
                let sheets: Vec<Value> = info
                    .get("sheets")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|s| s.pointer("/properties/title").cloned())
                    .collect();
                let mut row = Row::new();
                row.insert("spreadsheetId".to_string(), info.get("spreadsheetId").cloned().unwrap_or(Value::Null));
                row.insert("title".to_string(), info.pointer("/properties/title").cloned().unwrap_or(Value::Null));
                row.insert("sheets".to_string(), Value::Array(sheets));
                vec![row]
            }
        };
        Ok(RuntimeResult::with_rows(rows))
    }
}

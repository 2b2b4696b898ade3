// HTTP gateways for the tracker front-end
// Speech narration, on-demand weather and in-place weather updates of route files

use actix_cors::Cors;
use actix_files as fs;
use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::{middleware, web, App, HttpRequest, HttpResponse, HttpServer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::{get_current_timestamp, Result, WeatherUpdate};
use crate::patchers::patch_weather;
use crate::providers::{SpeechClient, WeatherClient};
use crate::route_csv::RouteTable;

/// Longest narration the speech provider accepts.
const MAX_SPEECH_CHARS: usize = 4096;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub weather: WeatherClient,
    pub speech: SpeechClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        Ok(AppState {
            weather: WeatherClient::new(&config)?,
            speech: SpeechClient::new(&config)?,
            config: Arc::new(config),
        })
    }
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: get_current_timestamp(),
        }
    }

    fn error(message: &str) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: get_current_timestamp(),
        }
    }
}

#[derive(Deserialize)]
struct WeatherQuery {
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Deserialize)]
struct UpdateWeatherRequest {
    file: Option<String>,
    updates: Option<Vec<WeatherUpdate>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UpdateSummary {
    pub file: String,
    pub updated: usize,
}

// ============================================================================
// API Endpoints
// ============================================================================

async fn synthesize_speech(state: web::Data<AppState>, body: web::Json<Value>) -> HttpResponse {
    let text = match body.get("text").and_then(Value::as_str).map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ => {
            return HttpResponse::BadRequest()
                .json(ApiResponse::<()>::error("Text is required"));
        }
    };

    if text.chars().count() > MAX_SPEECH_CHARS {
        return HttpResponse::BadRequest().json(ApiResponse::<()>::error(&format!(
            "Text must be at most {} characters",
            MAX_SPEECH_CHARS
        )));
    }

    let voice = match body.get("voice") {
        None | Some(Value::Null) => None,
        Some(Value::String(voice)) if !voice.trim().is_empty() => Some(voice.trim()),
        Some(_) => {
            return HttpResponse::BadRequest()
                .json(ApiResponse::<()>::error("Voice must be a non-empty string"));
        }
    };

    match state.speech.synthesize(text, voice).await {
        Ok(audio) => HttpResponse::Ok().content_type("audio/mpeg").body(audio),
        Err(e) => {
            error!("Speech synthesis failed: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate speech"))
        }
    }
}

async fn get_weather(state: web::Data<AppState>, query: web::Query<WeatherQuery>) -> HttpResponse {
    let (latitude, longitude) = match (query.lat, query.lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            return HttpResponse::BadRequest()
                .json(ApiResponse::<()>::error("Both lat and lon are required"));
        }
    };

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Coordinates are out of range"));
    }

    match state.weather.current(latitude, longitude).await {
        Ok(report) => {
            info!("Weather for ({}, {}): {}", latitude, longitude, report.condition);
            HttpResponse::Ok().json(ApiResponse::success(report))
        }
        Err(e) => {
            error!("Weather lookup failed: {}", e);
            HttpResponse::BadGateway()
                .json(ApiResponse::<()>::error("Failed to fetch weather"))
        }
    }
}

async fn update_weather(
    state: web::Data<AppState>,
    body: web::Json<UpdateWeatherRequest>,
) -> HttpResponse {
    let request = body.into_inner();

    let Some(file) = request.file.filter(|f| !f.trim().is_empty()) else {
        return HttpResponse::BadRequest().json(ApiResponse::<()>::error("File is required"));
    };

    if !state.config.is_allowed_file(&file) {
        warn!("Rejected weather update for {}", file);
        return HttpResponse::Forbidden()
            .json(ApiResponse::<()>::error("File is not allowed"));
    }

    let updates = match request.updates {
        Some(updates) if !updates.is_empty() => updates,
        _ => {
            return HttpResponse::BadRequest()
                .json(ApiResponse::<()>::error("Updates are required"));
        }
    };

    let path = state.config.data_file(&file);
    match tokio::task::spawn_blocking(move || -> Result<usize> {
        let mut table = RouteTable::load(&path)?;
        let updated = patch_weather(&mut table, &updates);
        table.save(&path)?;
        Ok(updated)
    })
    .await
    {
        Ok(Ok(updated)) => {
            info!("Updated weather on {} stops in {}", updated, file);
            HttpResponse::Ok().json(ApiResponse::success(UpdateSummary { file, updated }))
        }
        Ok(Err(e)) => {
            error!("Weather update of {} failed: {}", file, e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to update weather data"))
        }
        Err(e) => {
            error!("Weather update task failed: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to update weather data"))
        }
    }
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Santa Tracker API",
        "version": env!("CARGO_PKG_VERSION"),
        "speech_configured": state.config.openai_api_key.is_some(),
        "weather_configured": state.config.openweather_api_key.is_some(),
        "timestamp": get_current_timestamp(),
    }))
}

// Extractor failures answer with the same envelope as the handlers.
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    warn!("Rejected request body: {}", err);
    let response = HttpResponse::BadRequest().json(ApiResponse::<()>::error("Invalid request body"));
    InternalError::from_response(err, response).into()
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    warn!("Rejected query string: {}", err);
    let response = HttpResponse::BadRequest().json(ApiResponse::<()>::error("Invalid query parameters"));
    InternalError::from_response(err, response).into()
}

pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .app_data(web::QueryConfig::default().error_handler(query_error))
            .route("/speech", web::post().to(synthesize_speech))
            .route("/weather", web::get().to(get_weather))
            .route("/update-weather", web::post().to(update_weather)),
    );
}

// ============================================================================
// Server Setup
// ============================================================================

pub async fn run_server(state: AppState) -> std::io::Result<()> {
    let host = state.config.host.clone();
    let port = state.config.port;

    info!("Santa Tracker API listening on http://{}:{}", host, port);
    info!("Serving route files from {}", state.config.data_dir.display());
    info!("Routes: GET /health, POST /api/speech, GET /api/weather, POST /api/update-weather, GET /data/{{file}}");
    if state.config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set, speech requests will fail");
    }
    if state.config.openweather_api_key.is_none() {
        warn!("OPENWEATHER_API_KEY is not set, weather requests will fail");
    }

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(api_routes)
            .service(fs::Files::new("/data", state.config.data_dir.clone()))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

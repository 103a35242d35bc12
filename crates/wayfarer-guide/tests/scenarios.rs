//! End-to-end question scenarios around Taipei 101 against fake providers.
//!
//! Run with: `cargo test -p wayfarer-guide --test scenarios`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;
use image::{Rgb, RgbImage};
use serde_json::json;

use wayfarer_core::capability::Probe;
use wayfarer_core::error::{APOLOGY_MESSAGE, REQUEST_FAILED, RETRY_MESSAGE};
use wayfarer_core::types::{AnalysisRequest, AnalysisResponse, Coordinate};
use wayfarer_guide::capabilities::Capabilities;
use wayfarer_guide::client::{HttpInferenceGateway, InferenceGateway};
use wayfarer_guide::resolver::PlaceResolver;
use wayfarer_guide::session::{GuideSession, QuestionOutcome, SessionSettings};
use wayfarer_media::capture::{CameraDevice, MediaStream, StillStream, VideoConstraints};
use wayfarer_media::location::FixedLocation;
use wayfarer_media::speech::{ScriptedRecognition, Utterance, UtterancePlayer};
use wayfarer_providers::maps::{LazyMaps, MapsLoader, MapsProvider, NearbySearch, PlaceResult};

const TAIPEI_101: Coordinate = Coordinate::new(25.0330, 121.5654);

/// A place `meters_north` of Taipei 101 (one degree of latitude ≈ 111 km).
fn place(id: &str, meters_north: f64, rated: bool) -> PlaceResult {
    PlaceResult {
        place_id: Some(id.into()),
        name: Some(id.into()),
        types: vec!["point_of_interest".into()],
        vicinity: None,
        rating: rated.then_some(4.5),
        location: Some(Coordinate::new(
            TAIPEI_101.latitude + meters_north / 111_320.0,
            TAIPEI_101.longitude,
        )),
    }
}

struct FakeMaps {
    rated: Vec<PlaceResult>,
    broader: Vec<PlaceResult>,
    geocode_fails: bool,
    broader_searches: AtomicUsize,
}

#[async_trait]
impl MapsProvider for FakeMaps {
    async fn reverse_geocode(&self, _at: &Coordinate) -> anyhow::Result<Option<String>> {
        if self.geocode_fails {
            anyhow::bail!("geocoder threw");
        }
        Ok(Some("110台北市信義區信義路五段7號".into()))
    }

    async fn nearby_search(&self, search: &NearbySearch) -> anyhow::Result<Vec<PlaceResult>> {
        assert_eq!(search.radius_meters, 500);
        if search.place_type.is_some() {
            self.broader_searches.fetch_add(1, Ordering::SeqCst);
            return Ok(self.broader.clone());
        }
        Ok(self.rated.clone())
    }
}

struct FakeLoader(Arc<FakeMaps>);

#[async_trait]
impl MapsLoader for FakeLoader {
    async fn load(&self) -> anyhow::Result<Arc<dyn MapsProvider>> {
        Ok(self.0.clone())
    }
}

struct Camera;

#[async_trait]
impl CameraDevice for Camera {
    async fn get_user_media(&self, _c: &VideoConstraints) -> anyhow::Result<Arc<dyn MediaStream>> {
        Ok(Arc::new(StillStream::new(RgbImage::from_pixel(32, 24, Rgb([90, 120, 180])))))
    }
}

#[derive(Default)]
struct Speech {
    spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl UtterancePlayer for Speech {
    async fn play(&self, utterance: &Utterance) -> anyhow::Result<()> {
        self.spoken.lock().unwrap().push(utterance.text.clone());
        Ok(())
    }
}

/// Records the prompt and answers with a fixed text.
#[derive(Default)]
struct PromptRecorder {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl InferenceGateway for PromptRecorder {
    async fn analyze(&self, request: AnalysisRequest) -> AnalysisResponse {
        assert_eq!(&request.image[..2], &[0xFF, 0xD8]);
        self.prompts.lock().unwrap().push(request.prompt);
        AnalysisResponse::ok("您正在台北101附近。")
    }
}

fn fake_maps(rated: Vec<PlaceResult>, broader: Vec<PlaceResult>, geocode_fails: bool) -> Arc<FakeMaps> {
    Arc::new(FakeMaps {
        rated,
        broader,
        geocode_fails,
        broader_searches: AtomicUsize::new(0),
    })
}

fn session(
    maps: Arc<FakeMaps>,
    gateway: Arc<dyn InferenceGateway>,
    speech: Arc<Speech>,
    question: &str,
) -> GuideSession {
    let capabilities = Capabilities {
        camera: Probe::Present(Arc::new(Camera)),
        geolocation: Probe::Present(Arc::new(FixedLocation::new(Some(TAIPEI_101)))),
        speech_recognition: Probe::Present(Arc::new(ScriptedRecognition::new([question]))),
        speech_synthesis: Probe::Present(speech),
        maps: Probe::Present(Arc::new(FakeLoader(maps))),
    };
    GuideSession::new(capabilities, gateway, SessionSettings::default())
}

#[tokio::test]
async fn test_six_rated_places_need_no_broader_search() {
    let maps = fake_maps(
        vec![
            place("a", 400.0, true),
            place("b", 50.0, true),
            place("c", 300.0, true),
            place("d", 120.0, true),
            place("e", 450.0, true),
            place("f", 10.0, true),
        ],
        vec![place("x", 5.0, false)],
        false,
    );
    let resolver = PlaceResolver::new(Arc::new(LazyMaps::new(Arc::new(FakeLoader(maps.clone())))));

    let landmarks = resolver.nearby_landmarks(&TAIPEI_101, 500).await;
    let names: Vec<_> = landmarks.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["f", "b", "d", "c", "a", "e"]);
    assert_eq!(maps.broader_searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_two_rated_places_are_topped_up() {
    let maps = fake_maps(
        vec![place("a", 200.0, true), place("b", 100.0, true)],
        vec![
            place("p", 450.0, false),
            place("q", 20.0, false),
            place("r", 150.0, false),
            place("s", 60.0, false),
        ],
        false,
    );
    let resolver = PlaceResolver::new(Arc::new(LazyMaps::new(Arc::new(FakeLoader(maps.clone())))));

    let landmarks = resolver.nearby_landmarks(&TAIPEI_101, 500).await;
    assert_eq!(maps.broader_searches.load(Ordering::SeqCst), 1);
    assert_eq!(landmarks.len(), 5);
    assert!(landmarks.windows(2).all(|w| w[0].distance_meters <= w[1].distance_meters));

    let names: Vec<_> = landmarks.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["q", "b", "r", "a", "p"]);
}

#[tokio::test]
async fn test_geocoding_failure_falls_back_to_coordinates() {
    let maps = fake_maps(vec![place("a", 80.0, true)], vec![], true);
    let recorder = Arc::new(PromptRecorder::default());
    let speech = Arc::new(Speech::default());
    let session = session(maps, recorder.clone(), speech.clone(), "這是什麼建築？");
    session.start().await.unwrap();

    let outcome = session.listen_once().await;
    assert_eq!(outcome, Some(QuestionOutcome::Answered("您正在台北101附近。".into())));

    let prompts = recorder.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("目前位置：緯度 25.033，經度 121.5654"));
    assert!(prompts[0].contains("這是什麼建築？"));
    assert!(prompts[0].contains("a（point_of_interest，距離約 80 公尺）"));
    drop(prompts);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(speech.spoken.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rate_limited_endpoint_shows_retry_and_stays_silent() {
    let app = Router::new().route(
        "/analyze",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({"error": "rate limited"})),
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let gateway = Arc::new(
        HttpInferenceGateway::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap(),
    );

    let direct = gateway
        .analyze(AnalysisRequest {
            image: vec![0xFF, 0xD8],
            prompt: "test".into(),
            location: None,
        })
        .await;
    assert_eq!(direct.text, APOLOGY_MESSAGE);
    assert_eq!(direct.error.as_deref(), Some(REQUEST_FAILED));

    let speech = Arc::new(Speech::default());
    let maps = fake_maps(vec![], vec![], false);
    let session = session(maps, gateway, speech.clone(), "這是哪裡？");
    session.start().await.unwrap();

    let outcome = session.listen_once().await;
    assert_eq!(outcome, Some(QuestionOutcome::Failed(RETRY_MESSAGE.into())));
    assert_eq!(session.state().last_answer, RETRY_MESSAGE);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(speech.spoken.lock().unwrap().is_empty());
}

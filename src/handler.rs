use std::net::{IpAddr, SocketAddr};

use actix_web::{
    get, http::header::ContentType, post, web, HttpRequest, HttpResponse, Responder,
};
use tracing::info;

use crate::{
    claim::ClaimError,
    error::Rejection,
    types::{AppState, VerifyRequest, VerifyResponse},
};

const API_KEY_HEADER: &str = "x-api-key";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(liveness).service(verify_location);
}

#[get("/api")]
async fn liveness() -> impl Responder {
    HttpResponse::Ok()
        .insert_header(ContentType::plaintext())
        .body("Hello World")
}

/// The body is taken as raw bytes so the credential is checked before
/// anything in it is decoded.
#[post("/api/verify")]
async fn verify_location(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder, Rejection> {
    let credential = req.headers().get(API_KEY_HEADER).map(|v| v.as_bytes());
    state.authority.authorize(credential)?;

    let request: VerifyRequest = serde_json::from_slice(&body).map_err(|e| {
        info!(error = %e, "rejected: undecodable body");
        Rejection::from(ClaimError::Body)
    })?;

    let client_ip = client_ip(&req, state.trust_forwarded_headers);
    let attestation = state.authority.attest(request, client_ip).await?;

    Ok(web::Json(VerifyResponse {
        signature: attestation.signature_hex(),
    }))
}

/// Socket peer address. Forwarding headers are client-controlled, so they are
/// read only when the operator has said a trusted proxy sets them.
fn client_ip(req: &HttpRequest, trust_forwarded_headers: bool) -> Option<IpAddr> {
    if !trust_forwarded_headers {
        return req.peer_addr().map(|addr| addr.ip());
    }
    let info = req.connection_info();
    let addr = info.realip_remote_addr()?;
    addr.parse::<IpAddr>()
        .ok()
        .or_else(|| addr.parse::<SocketAddr>().ok().map(|s| s.ip()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{http::StatusCode, test as actix_test, App};

    use super::*;
    use crate::{
        authority::{ApiKey, Authority},
        claim::parse_wallet_address,
        registry::{Destination, InMemoryRegistry},
        signer::{
            attestation_digest, recover_address, AttestationSigner, SigningIdentity,
            UnavailableSigner,
        },
        types::ErrorResponse,
    };

    const SECRET: &str = "s3cr3t";
    const WALLET: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn registry() -> Arc<InMemoryRegistry> {
        Arc::new(InMemoryRegistry::new(vec![Destination {
            id: 1,
            latitude: 28.0026,
            longitude: 86.8528,
            jurisdiction: "NP",
        }]))
    }

    fn state(
        registry: Arc<InMemoryRegistry>,
        signer: Arc<dyn AttestationSigner>,
    ) -> web::Data<AppState> {
        web::Data::new(AppState {
            authority: Authority::new(ApiKey::new(SECRET).expect("non-empty"), registry, signer),
            trust_forwarded_headers: false,
        })
    }

    fn verify_request(key: Option<&str>, body: serde_json::Value) -> actix_test::TestRequest {
        let req = actix_test::TestRequest::post().uri("/api/verify").set_json(body);
        match key {
            Some(key) => req.insert_header((API_KEY_HEADER, key)),
            None => req,
        }
    }

    fn claim(
        destination_id: i64,
        lat: serde_json::Value,
        lon: serde_json::Value,
    ) -> serde_json::Value {
        serde_json::json!({
            "walletAddress": WALLET,
            "destinationId": destination_id,
            "userLat": lat,
            "userLon": lon,
        })
    }

    #[actix_web::test]
    async fn liveness_returns_hello_world() {
        let app = actix_test::init_service(
            App::new()
                .app_data(state(registry(), Arc::new(SigningIdentity::generate())))
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/api").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(actix_test::read_body(resp).await, "Hello World");
    }

    #[actix_web::test]
    async fn signs_claim_at_destination() {
        let signer = Arc::new(SigningIdentity::generate());
        let app = actix_test::init_service(
            App::new()
                .app_data(state(registry(), signer.clone()))
                .configure(configure),
        )
        .await;

        let req = verify_request(
            Some(SECRET),
            claim(1, serde_json::json!(28.0026), serde_json::json!(86.8528)),
        );
        let resp = actix_test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: VerifyResponse = actix_test::read_body_json(resp).await;
        let sig = hex::decode(body.signature.strip_prefix("0x").expect("0x prefix"))
            .expect("hex signature");
        assert_eq!(sig.len(), 65);

        let digest = attestation_digest(&parse_wallet_address(WALLET).expect("valid"), 1);
        assert_eq!(recover_address(&digest, &sig), Some(signer.address()));
    }

    #[actix_web::test]
    async fn string_coordinates_are_accepted() {
        let app = actix_test::init_service(
            App::new()
                .app_data(state(registry(), Arc::new(SigningIdentity::generate())))
                .configure(configure),
        )
        .await;

        let req = verify_request(
            Some(SECRET),
            claim(1, serde_json::json!("28.0026"), serde_json::json!("86.8528")),
        );
        let resp = actix_test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn wrong_key_is_unauthorized_before_any_lookup() {
        let registry = registry();
        let app = actix_test::init_service(
            App::new()
                .app_data(state(registry.clone(), Arc::new(SigningIdentity::generate())))
                .configure(configure),
        )
        .await;

        for key in [Some("wrong"), None] {
            let req = verify_request(
                key,
                claim(1, serde_json::json!(28.0026), serde_json::json!(86.8528)),
            );
            let resp = actix_test::call_service(&app, req.to_request()).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            let body: ErrorResponse = actix_test::read_body_json(resp).await;
            assert_eq!(body.error, "Unauthorized");
        }
        assert_eq!(registry.lookups(), 0);
    }

    #[actix_web::test]
    async fn bad_key_wins_over_bad_body() {
        let app = actix_test::init_service(
            App::new()
                .app_data(state(registry(), Arc::new(SigningIdentity::generate())))
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/verify")
            .insert_header((API_KEY_HEADER, "wrong"))
            .set_payload("not json");
        let resp = actix_test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn unknown_destination_is_not_found() {
        let app = actix_test::init_service(
            App::new()
                .app_data(state(registry(), Arc::new(SigningIdentity::generate())))
                .configure(configure),
        )
        .await;

        for (lat, lon) in [(28.0026, 86.8528), (0.0, 0.0)] {
            let req = verify_request(
                Some(SECRET),
                claim(9999, serde_json::json!(lat), serde_json::json!(lon)),
            );
            let resp = actix_test::call_service(&app, req.to_request()).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
            let body: ErrorResponse = actix_test::read_body_json(resp).await;
            assert_eq!(body.error, "Destination not found.");
        }
    }

    #[actix_web::test]
    async fn missing_latitude_is_bad_request_before_lookup() {
        let registry = registry();
        let app = actix_test::init_service(
            App::new()
                .app_data(state(registry.clone(), Arc::new(SigningIdentity::generate())))
                .configure(configure),
        )
        .await;

        let req = verify_request(
            Some(SECRET),
            serde_json::json!({
                "walletAddress": WALLET,
                "destinationId": 1,
                "userLon": 86.8528,
            }),
        );
        let resp = actix_test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = actix_test::read_body_json(resp).await;
        assert_eq!(body.error, "Missing required parameters.");
        assert_eq!(registry.lookups(), 0);
    }

    #[actix_web::test]
    async fn malformed_input_is_bad_request() {
        let app = actix_test::init_service(
            App::new()
                .app_data(state(registry(), Arc::new(SigningIdentity::generate())))
                .configure(configure),
        )
        .await;

        let cases = [
            (
                claim(1, serde_json::json!("north"), serde_json::json!(86.8528)),
                "Invalid coordinates.",
            ),
            (
                serde_json::json!({
                    "walletAddress": "not-an-address",
                    "destinationId": 1,
                    "userLat": 28.0026,
                    "userLon": 86.8528,
                }),
                "Invalid wallet address.",
            ),
            (
                serde_json::json!({
                    "walletAddress": WALLET,
                    "destinationId": "one",
                    "userLat": 28.0026,
                    "userLon": 86.8528,
                }),
                "Invalid request body.",
            ),
        ];
        for (body, message) in cases {
            let req = verify_request(Some(SECRET), body).to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: ErrorResponse = actix_test::read_body_json(resp).await;
            assert_eq!(body.error, message);
        }
    }

    #[actix_web::test]
    async fn far_claim_is_forbidden_with_distance() {
        let app = actix_test::init_service(
            App::new()
                .app_data(state(registry(), Arc::new(SigningIdentity::generate())))
                .configure(configure),
        )
        .await;

        let req = verify_request(
            Some(SECRET),
            claim(1, serde_json::json!(0), serde_json::json!(0)),
        );
        let resp = actix_test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body: ErrorResponse = actix_test::read_body_json(resp).await;
        let meters: u64 = body
            .error
            .strip_prefix("You are ")
            .and_then(|rest| rest.strip_suffix(" meters away."))
            .and_then(|n| n.parse().ok())
            .unwrap_or_else(|| panic!("unexpected message {:?}", body.error));
        assert!(meters > 1_000_000, "{meters}");
    }

    #[actix_web::test]
    async fn signer_failure_is_internal_error() {
        let app = actix_test::init_service(
            App::new()
                .app_data(state(registry(), Arc::new(UnavailableSigner)))
                .configure(configure),
        )
        .await;

        let req = verify_request(
            Some(SECRET),
            claim(1, serde_json::json!(28.0026), serde_json::json!(86.8528)),
        );
        let resp = actix_test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = actix_test::read_body_json(resp).await;
        assert_eq!(body.error, "Internal server error.");
    }

    #[actix_web::test]
    async fn negative_destination_is_not_found() {
        let registry = registry();
        let app = actix_test::init_service(
            App::new()
                .app_data(state(registry.clone(), Arc::new(SigningIdentity::generate())))
                .configure(configure),
        )
        .await;

        let req = verify_request(
            Some(SECRET),
            claim(-1, serde_json::json!(28.0026), serde_json::json!(86.8528)),
        );
        let resp = actix_test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: ErrorResponse = actix_test::read_body_json(resp).await;
        assert_eq!(body.error, "Destination not found.");
        assert_eq!(registry.lookups(), 0);
    }

    #[actix_web::test]
    async fn spoofed_forwarded_header_is_ignored_by_default() {
        let peer = "10.0.0.1:4000".parse().expect("socket addr");
        for header in ["x-forwarded-for", "forwarded"] {
            let value = if header == "forwarded" {
                "for=203.0.113.7"
            } else {
                "203.0.113.7"
            };
            let req = actix_test::TestRequest::default()
                .insert_header((header, value))
                .peer_addr(peer)
                .to_http_request();
            assert_eq!(client_ip(&req, false), Some("10.0.0.1".parse().expect("ip")));
        }

        let req = actix_test::TestRequest::default().to_http_request();
        assert_eq!(client_ip(&req, false), None);
    }

    #[actix_web::test]
    async fn trusted_proxy_header_is_honoured() {
        let peer = "10.0.0.1:4000".parse().expect("socket addr");
        let req = actix_test::TestRequest::default()
            .insert_header(("x-forwarded-for", "203.0.113.7"))
            .peer_addr(peer)
            .to_http_request();
        assert_eq!(client_ip(&req, true), Some("203.0.113.7".parse().expect("ip")));

        let req = actix_test::TestRequest::default().peer_addr(peer).to_http_request();
        assert_eq!(client_ip(&req, true), Some("10.0.0.1".parse().expect("ip")));
    }
}

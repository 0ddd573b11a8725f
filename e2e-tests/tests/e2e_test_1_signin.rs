// E2E Test 1: Signup and signin
// Tests the session flow: signup → signin → protected pages

mod e2e;

use e2e::client::PrepForgeClient;
use e2e::helpers::{TestEnv, TestResult};
use reqwest::StatusCode;
use std::time::Instant;

#[tokio::test]
#[ignore = "requires a running PrepForge instance (PREPFORGE_URL)"]
async fn test_e2e_1_signup_and_signin() {
    let start = Instant::now();
    let test_name = "E2E Test 1: Signup and signin";

    println!("\n🚀 Starting: {}", test_name);
    println!("{}", "=".repeat(80));

    let env = TestEnv::new();

    println!("\n📋 Step 1: Checking service...");
    if let Err(e) = env.wait_for_service(30).await {
        TestResult::failed(test_name, e, start).print();
        panic!("Service check failed");
    }

    let client = PrepForgeClient::new(&env.base_url).unwrap();

    println!("\n📋 Step 2: Protected page without a session...");
    assert_eq!(client.get("/dashboard").await.unwrap(), StatusCode::FOUND);

    println!("\n📋 Step 3: Signing up...");
    let email = env.unique_email("signin");
    let status = client
        .signup("E2E Student", &email, &env.test_user_password)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    println!("\n📋 Step 4: Wrong password...");
    assert!(client.signin(&email, "wrong-password").await.is_err());

    println!("\n📋 Step 5: Signing in...");
    let target = client
        .signin(&email, &env.test_user_password)
        .await
        .unwrap();
    assert_eq!(target, "/dashboard");

    println!("\n📋 Step 6: Visiting pages...");
    for page in ["/dashboard", "/practice", "/quiz", "/pricing"] {
        assert_eq!(client.get(page).await.unwrap(), StatusCode::OK, "{}", page);
    }

    TestResult::passed(test_name, start).print();
}

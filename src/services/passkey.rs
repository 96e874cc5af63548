use crate::config::Config;
use crate::db::{ChallengeCache, CredentialStore, Database, UserStore};
use crate::error::{AppError, Result};
use crate::models::{
    ChallengePurpose, CredentialSummary, NewCredential, PasskeyCredential, User,
};
use crate::services::NotifyService;
use crate::webauthn::authenticator::{parse_attestation_object, AuthenticatorData};
use crate::webauthn::client_data::{CeremonyType, CollectedClientData};
use crate::webauthn::types::{
    accepted_params, AuthenticationCredential, AuthenticatorSelection, CreationOptions,
    CredentialDescriptor, RegistrationCredential, RelyingPartyInfo, RequestOptions, UserEntity,
    ACCEPTED_ALGORITHMS,
};
use crate::webauthn::verify::{assertion_signature_base, verify_signature};
use crate::webauthn::{b64_decode, b64_encode, generate_challenge, random_token, RelyingParty};

/// Registration and authentication ceremony orchestration.
///
/// Each ceremony is begin/finish: begin issues a single-use challenge into
/// the cache (last-writer-wins per key), finish consumes it atomically and
/// verifies the signed client response against it.
pub struct PasskeyService;

impl PasskeyService {
    fn user_key(user_id: &str) -> String {
        format!("user:{}", user_id)
    }

    fn anon_key() -> String {
        format!("anon:{}", random_token())
    }

    /// Build creation options for the given account and cache the challenge.
    /// Any previously pending registration for this user is invalidated.
    pub async fn begin_registration(
        db: &Database,
        config: &Config,
        email: &str,
    ) -> Result<CreationOptions> {
        let rp = RelyingParty::from_config(config)?;
        let user = UserStore::find_by_email(db, email).await?;

        // Existing credentials become the exclusion list so the same
        // authenticator cannot be enrolled twice for this account
        let exclude_credentials = CredentialStore::find_by_user(db, &user.id)
            .await?
            .into_iter()
            .map(|c| {
                let transports = c.transport_hints();
                CredentialDescriptor::new(
                    c.credential_id,
                    if transports.is_empty() { None } else { Some(transports) },
                )
            })
            .collect();

        let challenge = b64_encode(&generate_challenge());
        ChallengeCache::put(
            db,
            &Self::user_key(&user.id),
            &challenge,
            ChallengePurpose::Registration,
            config.webauthn.challenge_ttl_secs,
        )
        .await?;

        Ok(CreationOptions {
            rp: RelyingPartyInfo {
                id: rp.id,
                name: rp.name,
            },
            user: UserEntity {
                id: b64_encode(user.id.as_bytes()),
                name: user.email.clone(),
                display_name: user.name.clone(),
            },
            challenge,
            pub_key_cred_params: accepted_params(),
            timeout: config.webauthn.ceremony_timeout_ms,
            attestation: "none".to_string(),
            authenticator_selection: AuthenticatorSelection {
                resident_key: "preferred".to_string(),
                user_verification: "preferred".to_string(),
            },
            exclude_credentials,
        })
    }

    /// Verify an attestation response and persist the new credential
    pub async fn finish_registration(
        db: &Database,
        config: &Config,
        email: &str,
        credential: RegistrationCredential,
        display_name: Option<String>,
    ) -> Result<CredentialSummary> {
        let rp = RelyingParty::from_config(config)?;
        let user = UserStore::find_by_email(db, email).await?;

        let pending = ChallengeCache::take_and_invalidate(db, &Self::user_key(&user.id))
            .await?
            .ok_or(AppError::NoPendingChallenge)?;
        if pending.purpose() != ChallengePurpose::Registration {
            return Err(AppError::NoPendingChallenge);
        }

        let client_data_bytes = b64_decode(&credential.response.client_data_json)?;
        CollectedClientData::parse(&client_data_bytes)?.verify(
            CeremonyType::Create,
            &pending.challenge,
            &rp.origin,
        )?;

        let attestation_bytes = b64_decode(&credential.response.attestation_object)?;
        let auth_data = parse_attestation_object(&attestation_bytes)?;
        auth_data.verify_common(&rp.id)?;

        let attested = auth_data
            .attested
            .as_ref()
            .ok_or_else(|| AppError::VerificationFailed("No attested credential".to_string()))?;

        // The outer credential id must match the one embedded in authData
        if b64_decode(&credential.id)? != attested.credential_id {
            return Err(AppError::VerificationFailed(
                "Credential id mismatch".to_string(),
            ));
        }

        if !ACCEPTED_ALGORITHMS.contains(&attested.algorithm) {
            return Err(AppError::VerificationFailed(format!(
                "Unacceptable algorithm: {}",
                attested.algorithm
            )));
        }

        let stored = CredentialStore::insert(
            db,
            NewCredential {
                user_id: user.id.clone(),
                credential_id: b64_encode(&attested.credential_id),
                public_key: attested.cose_key.clone(),
                algorithm: attested.algorithm,
                sign_counter: auth_data.sign_count as i64,
                transports: credential.response.transports.clone(),
                display_name: display_name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| "Passkey".to_string()),
            },
        )
        .await?;

        NotifyService::notify(config, &user.id, "passkey_registered");

        Ok(CredentialSummary::from(stored))
    }

    /// Build assertion options. With an email the allow list is scoped to
    /// that account's credentials; without one the authenticator is free to
    /// present any discoverable credential and the returned key must be
    /// echoed back at finish time.
    pub async fn begin_authentication(
        db: &Database,
        config: &Config,
        email: Option<&str>,
    ) -> Result<(Option<String>, RequestOptions)> {
        let rp = RelyingParty::from_config(config)?;

        let (key, anon_key, allow_credentials) = match email {
            Some(email) => {
                let user = UserStore::find_by_email(db, email).await?;
                let creds = CredentialStore::find_by_user(db, &user.id).await?;
                if creds.is_empty() {
                    return Err(AppError::NoCredentialsRegistered);
                }
                let allow = creds
                    .into_iter()
                    .map(|c| {
                        let transports = c.transport_hints();
                        CredentialDescriptor::new(
                            c.credential_id,
                            if transports.is_empty() { None } else { Some(transports) },
                        )
                    })
                    .collect();
                (Self::user_key(&user.id), None, allow)
            }
            None => {
                let key = Self::anon_key();
                (key.clone(), Some(key), Vec::new())
            }
        };

        let challenge = b64_encode(&generate_challenge());
        ChallengeCache::put(
            db,
            &key,
            &challenge,
            ChallengePurpose::Authentication,
            config.webauthn.challenge_ttl_secs,
        )
        .await?;

        Ok((
            anon_key,
            RequestOptions {
                challenge,
                timeout: config.webauthn.ceremony_timeout_ms,
                rp_id: rp.id,
                allow_credentials,
                user_verification: "preferred".to_string(),
            },
        ))
    }

    /// Verify an assertion response and resolve the authenticated user.
    /// Token issuance is the caller's concern.
    pub async fn finish_authentication(
        db: &Database,
        config: &Config,
        email: Option<&str>,
        challenge_key: Option<&str>,
        credential: AuthenticationCredential,
    ) -> Result<User> {
        let rp = RelyingParty::from_config(config)?;

        let (key, expected_user_id) = match (email, challenge_key) {
            (Some(email), _) => {
                let user = UserStore::find_by_email(db, email).await?;
                (Self::user_key(&user.id), Some(user.id))
            }
            (None, Some(key)) => (key.to_string(), None),
            (None, None) => {
                return Err(AppError::BadRequest(
                    "Either email or challenge_key is required".to_string(),
                ));
            }
        };

        let pending = ChallengeCache::take_and_invalidate(db, &key)
            .await?
            .ok_or(AppError::NoPendingChallenge)?;
        if pending.purpose() != ChallengePurpose::Authentication {
            return Err(AppError::NoPendingChallenge);
        }

        let stored = CredentialStore::find_by_credential_id(db, &credential.id)
            .await?
            .ok_or(AppError::UnknownCredential)?;

        // A scoped ceremony must resolve to a credential of that account
        if let Some(expected) = &expected_user_id {
            if &stored.user_id != expected {
                return Err(AppError::UnknownCredential);
            }
        }

        let client_data_bytes = b64_decode(&credential.response.client_data_json)?;
        CollectedClientData::parse(&client_data_bytes)?.verify(
            CeremonyType::Get,
            &pending.challenge,
            &rp.origin,
        )?;

        let auth_data_bytes = b64_decode(&credential.response.authenticator_data)?;
        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
        auth_data.verify_common(&rp.id)?;

        let signature = b64_decode(&credential.response.signature)?;
        let signature_base = assertion_signature_base(&auth_data_bytes, &client_data_bytes);
        verify_signature(
            &stored.public_key,
            stored.algorithm,
            &signature_base,
            &signature,
        )?;

        Self::check_and_update_counter(db, &stored, &auth_data).await?;

        let user = UserStore::find_by_id(db, &stored.user_id).await?;
        NotifyService::notify(config, &user.id, "passkey_login");

        Ok(user)
    }

    /// Clone-detection counter policy: the assertion counter must strictly
    /// increase, except for authenticators that never implement the counter
    /// and always report zero. A zero assertion against a non-zero stored
    /// counter is a regression like any other.
    async fn check_and_update_counter(
        db: &Database,
        stored: &PasskeyCredential,
        auth_data: &AuthenticatorData,
    ) -> Result<()> {
        let assertion_counter = auth_data.sign_count as i64;
        let counter_disabled = assertion_counter == 0 && stored.sign_counter == 0;

        if !counter_disabled && assertion_counter <= stored.sign_counter {
            return Err(AppError::CounterRegressed);
        }

        CredentialStore::update_counter_and_usage(db, &stored.credential_id, assertion_counter)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::webauthn::sim::SoftAuthenticator;

    const RP_ID: &str = "localhost";
    const ORIGIN: &str = "http://localhost:3000";
    const EMAIL: &str = "alice@example.com";

    async fn setup() -> (Database, Config) {
        let db = test_db().await;
        let config = Config::default();
        UserStore::insert(&db, EMAIL, "Alice", "hash").await.unwrap();
        (db, config)
    }

    async fn register(
        db: &Database,
        config: &Config,
        email: &str,
        authenticator: &SoftAuthenticator,
    ) -> CredentialSummary {
        let options = PasskeyService::begin_registration(db, config, email)
            .await
            .unwrap();
        let response = authenticator.register(&options.challenge, RP_ID, ORIGIN);
        PasskeyService::finish_registration(db, config, email, response, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn registration_round_trip_persists_credential() {
        let (db, config) = setup().await;
        let authenticator = SoftAuthenticator::new();

        let summary = register(&db, &config, EMAIL, &authenticator).await;
        assert_eq!(summary.credential_id, authenticator.credential_id_b64());
        assert_eq!(summary.display_name, "Passkey");

        let user = UserStore::find_by_email(&db, EMAIL).await.unwrap();
        let creds = CredentialStore::find_by_user(&db, &user.id).await.unwrap();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].credential_id, authenticator.credential_id_b64());
    }

    #[tokio::test]
    async fn begin_registration_for_unknown_email_fails() {
        let (db, config) = setup().await;
        let err = PasskeyService::begin_registration(&db, &config, "nobody@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UserNotFound));
    }

    #[tokio::test]
    async fn second_begin_invalidates_first_challenge() {
        let (db, config) = setup().await;
        let authenticator = SoftAuthenticator::new();

        let first = PasskeyService::begin_registration(&db, &config, EMAIL)
            .await
            .unwrap();
        let _second = PasskeyService::begin_registration(&db, &config, EMAIL)
            .await
            .unwrap();

        // Respond against the superseded challenge
        let response = authenticator.register(&first.challenge, RP_ID, ORIGIN);
        let err = PasskeyService::finish_registration(&db, &config, EMAIL, response, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoPendingChallenge));
    }

    #[tokio::test]
    async fn concurrent_double_submit_lets_exactly_one_win() {
        let (db, config) = setup().await;
        let authenticator = SoftAuthenticator::new();

        let options = PasskeyService::begin_registration(&db, &config, EMAIL)
            .await
            .unwrap();
        let response = authenticator.register(&options.challenge, RP_ID, ORIGIN);

        let (r1, r2) = tokio::join!(
            PasskeyService::finish_registration(&db, &config, EMAIL, response.clone(), None),
            PasskeyService::finish_registration(&db, &config, EMAIL, response.clone(), None),
        );

        assert!(r1.is_ok() != r2.is_ok(), "exactly one submission must win");
        let loser = if r1.is_ok() { r2 } else { r1 };
        assert!(matches!(loser.unwrap_err(), AppError::NoPendingChallenge));
    }

    #[tokio::test]
    async fn same_authenticator_cannot_register_for_two_accounts() {
        let (db, config) = setup().await;
        UserStore::insert(&db, "bob@example.com", "Bob", "hash")
            .await
            .unwrap();
        let authenticator = SoftAuthenticator::new();

        register(&db, &config, EMAIL, &authenticator).await;

        let options = PasskeyService::begin_registration(&db, &config, "bob@example.com")
            .await
            .unwrap();
        let response = authenticator.register(&options.challenge, RP_ID, ORIGIN);
        let err =
            PasskeyService::finish_registration(&db, &config, "bob@example.com", response, None)
                .await
                .unwrap_err();
        assert!(matches!(err, AppError::DuplicateCredential));
    }

    #[tokio::test]
    async fn wrong_origin_is_a_verification_failure() {
        let (db, config) = setup().await;
        let authenticator = SoftAuthenticator::new();

        let options = PasskeyService::begin_registration(&db, &config, EMAIL)
            .await
            .unwrap();
        let response = authenticator.register(&options.challenge, RP_ID, "https://evil.example");
        let err = PasskeyService::finish_registration(&db, &config, EMAIL, response, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
    }

    #[tokio::test]
    async fn begin_authentication_without_credentials_falls_back() {
        let (db, config) = setup().await;
        let err = PasskeyService::begin_authentication(&db, &config, Some(EMAIL))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoCredentialsRegistered));
    }

    #[tokio::test]
    async fn allow_list_contains_exactly_the_registered_credential() {
        let (db, config) = setup().await;
        let authenticator = SoftAuthenticator::new();
        register(&db, &config, EMAIL, &authenticator).await;

        let (anon_key, options) =
            PasskeyService::begin_authentication(&db, &config, Some(EMAIL))
                .await
                .unwrap();
        assert!(anon_key.is_none());
        assert_eq!(options.allow_credentials.len(), 1);
        assert_eq!(
            options.allow_credentials[0].id,
            authenticator.credential_id_b64()
        );
    }

    #[tokio::test]
    async fn authentication_round_trip_updates_counter_and_usage() {
        let (db, config) = setup().await;
        let authenticator = SoftAuthenticator::new();
        register(&db, &config, EMAIL, &authenticator).await;

        let (_, options) = PasskeyService::begin_authentication(&db, &config, Some(EMAIL))
            .await
            .unwrap();
        let assertion = authenticator.sign_assertion(&options.challenge, RP_ID, ORIGIN, 5);

        let user =
            PasskeyService::finish_authentication(&db, &config, Some(EMAIL), None, assertion)
                .await
                .unwrap();
        assert_eq!(user.email, EMAIL);

        let cred = CredentialStore::find_by_credential_id(&db, &authenticator.credential_id_b64())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.sign_counter, 5);
        assert!(cred.last_used_at.is_some());
    }

    #[tokio::test]
    async fn discoverable_flow_authenticates_via_challenge_key() {
        let (db, config) = setup().await;
        let authenticator = SoftAuthenticator::new();
        register(&db, &config, EMAIL, &authenticator).await;

        let (anon_key, options) = PasskeyService::begin_authentication(&db, &config, None)
            .await
            .unwrap();
        let key = anon_key.expect("anonymous flow returns a challenge key");
        assert!(options.allow_credentials.is_empty());

        let assertion = authenticator.sign_assertion(&options.challenge, RP_ID, ORIGIN, 1);
        let user =
            PasskeyService::finish_authentication(&db, &config, None, Some(&key), assertion)
                .await
                .unwrap();
        assert_eq!(user.email, EMAIL);
    }

    #[tokio::test]
    async fn counter_regression_is_fatal_and_leaves_state_untouched() {
        let (db, config) = setup().await;
        let authenticator = SoftAuthenticator::new();
        register(&db, &config, EMAIL, &authenticator).await;

        // Establish counter at 5
        let (_, options) = PasskeyService::begin_authentication(&db, &config, Some(EMAIL))
            .await
            .unwrap();
        let assertion = authenticator.sign_assertion(&options.challenge, RP_ID, ORIGIN, 5);
        PasskeyService::finish_authentication(&db, &config, Some(EMAIL), None, assertion)
            .await
            .unwrap();

        let before =
            CredentialStore::find_by_credential_id(&db, &authenticator.credential_id_b64())
                .await
                .unwrap()
                .unwrap();

        // Replay with the same counter value
        let (_, options) = PasskeyService::begin_authentication(&db, &config, Some(EMAIL))
            .await
            .unwrap();
        let assertion = authenticator.sign_assertion(&options.challenge, RP_ID, ORIGIN, 5);
        let err =
            PasskeyService::finish_authentication(&db, &config, Some(EMAIL), None, assertion)
                .await
                .unwrap_err();
        assert!(matches!(err, AppError::CounterRegressed));

        let after =
            CredentialStore::find_by_credential_id(&db, &authenticator.credential_id_b64())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(after.sign_counter, before.sign_counter);
        assert_eq!(after.last_used_at, before.last_used_at);
    }

    #[tokio::test]
    async fn always_zero_counter_authenticators_are_exempt() {
        let (db, config) = setup().await;
        let authenticator = SoftAuthenticator::new();
        register(&db, &config, EMAIL, &authenticator).await;

        for _ in 0..2 {
            let (_, options) = PasskeyService::begin_authentication(&db, &config, Some(EMAIL))
                .await
                .unwrap();
            let assertion = authenticator.sign_assertion(&options.challenge, RP_ID, ORIGIN, 0);
            PasskeyService::finish_authentication(&db, &config, Some(EMAIL), None, assertion)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn unknown_credential_is_rejected() {
        let (db, config) = setup().await;
        let registered = SoftAuthenticator::new();
        register(&db, &config, EMAIL, &registered).await;

        let stranger = SoftAuthenticator::new();
        let (_, options) = PasskeyService::begin_authentication(&db, &config, Some(EMAIL))
            .await
            .unwrap();
        let assertion = stranger.sign_assertion(&options.challenge, RP_ID, ORIGIN, 1);
        let err =
            PasskeyService::finish_authentication(&db, &config, Some(EMAIL), None, assertion)
                .await
                .unwrap_err();
        assert!(matches!(err, AppError::UnknownCredential));
    }

    #[tokio::test]
    async fn scoped_ceremony_rejects_credentials_of_other_accounts() {
        let (db, config) = setup().await;
        UserStore::insert(&db, "bob@example.com", "Bob", "hash")
            .await
            .unwrap();
        let alice_key = SoftAuthenticator::new();
        let bob_key = SoftAuthenticator::new();
        register(&db, &config, EMAIL, &alice_key).await;
        register(&db, &config, "bob@example.com", &bob_key).await;

        // Alice's ceremony answered with Bob's credential
        let (_, options) = PasskeyService::begin_authentication(&db, &config, Some(EMAIL))
            .await
            .unwrap();
        let assertion = bob_key.sign_assertion(&options.challenge, RP_ID, ORIGIN, 1);
        let err =
            PasskeyService::finish_authentication(&db, &config, Some(EMAIL), None, assertion)
                .await
                .unwrap_err();
        assert!(matches!(err, AppError::UnknownCredential));
    }
}

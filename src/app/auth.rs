use anyhow::{anyhow, Context, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use sqlx::Row;
use time::{Duration, OffsetDateTime};

use crate::app::memberships::MembershipService;
use crate::app::students::student_from_row;
use crate::domain::student::Student;
use crate::infra::db::Db;
use crate::AppState;

/// Issuer and audience of every access token.
const TOKEN_ISSUER: &str = "campus";
const ACCESS_TOKEN_TYPE: &str = "access";

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub student_id: i64,
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthService {
    db: Db,
    access_key: [u8; 32],
    access_ttl: Duration,
}

impl AuthService {
    pub fn new(db: Db, access_key: [u8; 32], access_ttl_minutes: u64) -> Self {
        Self {
            db,
            access_key,
            access_ttl: Duration::minutes(i64::try_from(access_ttl_minutes).unwrap_or(i64::MAX / 60)),
        }
    }

    pub fn for_state(state: &AppState) -> Self {
        Self::new(
            state.db.clone(),
            state.paseto_access_key,
            state.access_ttl_minutes,
        )
    }

    /// Creates the student and enrolls them in every default group in the
    /// same transaction.
    pub async fn register(&self, name: String, email: String, password: String) -> Result<Student> {
        let password_hash = hash_password(&password)?;

        let mut tx = self.db.begin().await?;
        let row = sqlx::query(
            "INSERT INTO students (name, email, password_hash) \
             VALUES ($1, $2, $3) \
             RETURNING id, name, email, created_at, updated_at",
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await?;
        let student = student_from_row(&row);

        let enrolled = MembershipService::new(self.db.clone())
            .enroll_in_defaults_with_tx(student.id, &mut tx)
            .await?;
        tx.commit().await?;

        tracing::info!(student_id = student.id, default_groups = enrolled, "student registered");
        Ok(student)
    }

    /// `None` for an unknown email or a wrong password; callers must not
    /// tell the two apart.
    pub async fn verify(&self, email: &str, password: &str) -> Result<Option<(Student, AccessToken)>> {
        let Some(row) = sqlx::query(
            "SELECT id, name, email, password_hash, created_at, updated_at \
             FROM students WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.db.pool())
        .await?
        else {
            return Ok(None);
        };

        let password_hash: String = row.get("password_hash");
        if !verify_password(password, &password_hash)? {
            tracing::debug!("password mismatch on verify");
            return Ok(None);
        }

        let student = student_from_row(&row);
        let token = self.issue_access_token(student.id)?;
        Ok(Some((student, token)))
    }

    /// `None` for tokens that fail decryption, validation, or are not
    /// access tokens.
    pub fn authenticate_access_token(&self, token: &str) -> Result<Option<AuthSession>> {
        let Some(claims) = self.open(token)? else {
            return Ok(None);
        };

        let token_type = claims.get_claim("typ").and_then(|value| value.as_str());
        if token_type != Some(ACCESS_TOKEN_TYPE) {
            return Ok(None);
        }

        let student_id = claims
            .get_claim("sub")
            .and_then(|value| value.as_str())
            .ok_or_else(|| anyhow!("access token has no sub claim"))?
            .parse::<i64>()
            .context("access token sub is not a student id")?;

        Ok(Some(AuthSession { student_id }))
    }

    pub fn issue_access_token(&self, student_id: i64) -> Result<AccessToken> {
        let ttl = std::time::Duration::try_from(self.access_ttl)
            .context("access token ttl must be positive")?;

        let mut claims = Claims::new_expires_in(&ttl)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&student_id.to_string())?;
        claims.add_additional("typ", ACCESS_TOKEN_TYPE)?;

        let token = local::encrypt(&self.key()?, &claims, None, None)?;
        Ok(AccessToken {
            token,
            expires_at: OffsetDateTime::now_utc() + self.access_ttl,
        })
    }

    fn key(&self) -> Result<SymmetricKey<V4>> {
        Ok(SymmetricKey::<V4>::from(&self.access_key)?)
    }

    fn open(&self, token: &str) -> Result<Option<Claims>> {
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_ISSUER);

        let Ok(untrusted) = UntrustedToken::<Local, V4>::try_from(token) else {
            return Ok(None);
        };
        let trusted = local::decrypt(&self.key()?, &untrusted, &rules, None, None).ok();
        Ok(trusted.and_then(|trusted| trusted.payload_claims().cloned()))
    }
}

pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {}", err))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| anyhow!("stored password hash is malformed: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

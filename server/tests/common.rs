//! Shared test fixtures: a minimal `Config` rooted in a tempdir, and a
//! JWT signer matching `access::TokenClaims`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tempfile::TempDir;

use ingest_server::access::{Role, TokenClaims};
use ingest_server::config::Config;

pub const SECRET: &str = "test-secret-p11";

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn uploads_root(&self) -> PathBuf {
        self.dir.path().join("uploads").join("p11")
    }

    pub fn export_root(&self) -> PathBuf {
        self.dir.path().join("export").join("p11")
    }

    pub fn config(&self) -> Config {
        let mut jwt_secrets = HashMap::new();
        jwt_secrets.insert("p11".to_string(), SECRET.to_string());

        let mut uploads_root = HashMap::new();
        uploads_root.insert("p11".to_string(), self.uploads_root());

        let mut export_root = HashMap::new();
        export_root.insert("p11".to_string(), self.export_root());

        std::fs::create_dir_all(self.uploads_root().join("p11-member-group")).unwrap();
        std::fs::create_dir_all(self.export_root()).unwrap();
        std::fs::create_dir_all(self.dir.path().join("sns")).unwrap();
        std::fs::create_dir_all(self.dir.path().join("gnupg")).unwrap();

        let yaml = format!(
            r#"
port: 0
jwt_secrets:
  p11: "{secret}"
uploads_root:
  p11: "{uploads}"
sns_uploads_root: "{sns}"
export_root:
  p11: "{export}"
gpg_binary: "/usr/bin/gpg"
gpg_homedir: "{gpg_home}"
gpg_keyring: "{gpg_home}/pubring.gpg"
gpg_secring: "{gpg_home}/secring.gpg"
public_key_id: "0xDEADBEEF"
"#,
            secret = SECRET,
            uploads = self.uploads_root().display(),
            sns = self.dir.path().join("sns").display(),
            export = self.export_root().display(),
            gpg_home = self.dir.path().join("gnupg").display(),
        );
        serde_yaml::from_str(&yaml).unwrap()
    }
}

pub fn sign(role: Role, pnum: &str, user: &str, groups: &[&str], exp_offset: i64, secret: &str) -> String {
    let claims = TokenClaims {
        role,
        exp: Utc::now().timestamp() + exp_offset,
        user: user.to_string(),
        pnum: pnum.to_string(),
        groups: groups.iter().map(|s| s.to_string()).collect(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn app_user_token() -> String {
    sign(Role::AppUser, "p11", "root", &["p11-member-group"], 60, SECRET)
}

pub fn export_user_token() -> String {
    sign(Role::ExportUser, "p11", "root", &["p11-member-group"], 60, SECRET)
}

pub fn admin_user_token() -> String {
    sign(Role::AdminUser, "p11", "root", &["p11-member-group"], 60, SECRET)
}

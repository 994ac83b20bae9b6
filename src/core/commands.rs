/// Database command lines executed inside the target container

use serde::{Deserialize, Serialize};

/// Media types that mark an upload as gzip-compressed
pub const COMPRESSED_MEDIA_TYPES: &[&str] = &["application/gzip", "application/x-gzip"];

/// Client binaries and account used inside the database container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseTools {
    pub client: String,
    pub dump: String,
    pub user: String,
    pub shell: String,
}

impl Default for DatabaseTools {
    fn default() -> Self {
        Self {
            client: "mariadb".to_string(),
            dump: "mariadb-dump".to_string(),
            user: "root".to_string(),
            shell: "bash".to_string(),
        }
    }
}

/// How the staged restore file is fed to the database client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// `gunzip -c <file> | client ...`
    DecompressPipe,
    /// `client ... < <file>`
    DirectRead,
}

impl RestoreMode {
    /// Chosen from the declared media type only, never from file content
    pub fn for_media_type(media_type: &str) -> Self {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if COMPRESSED_MEDIA_TYPES.contains(&essence.as_str()) {
            RestoreMode::DecompressPipe
        } else {
            RestoreMode::DirectRead
        }
    }
}

/// Quote a value for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

impl DatabaseTools {
    fn password_arg(secret: &str) -> String {
        format!("-p{}", secret)
    }

    /// Minimal read-only query used as the connectivity test
    pub fn connection_test(&self, secret: &str) -> Vec<String> {
        vec![
            self.client.clone(),
            "-u".to_string(),
            self.user.clone(),
            Self::password_arg(secret),
            "-e".to_string(),
            "SELECT 1".to_string(),
        ]
    }

    pub fn dump(&self, secret: &str, database: &str) -> Vec<String> {
        vec![
            self.dump.clone(),
            "-u".to_string(),
            self.user.clone(),
            Self::password_arg(secret),
            database.to_string(),
        ]
    }

    /// Shell pipeline that loads `staged_path` into `database`
    pub fn restore(&self, secret: &str, database: &str, staged_path: &str, mode: RestoreMode) -> Vec<String> {
        let client = format!(
            "{} -u {} {} {}",
            self.client,
            shell_quote(&self.user),
            shell_quote(&Self::password_arg(secret)),
            shell_quote(database),
        );

        let script = match mode {
            RestoreMode::DecompressPipe => {
                format!("gunzip -c {} | {}", shell_quote(staged_path), client)
            }
            RestoreMode::DirectRead => format!("{} < {}", client, shell_quote(staged_path)),
        };

        vec![self.shell.clone(), "-c".to_string(), script]
    }

    /// Removes the staged file inside the container
    pub fn remove_staged(&self, staged_path: &str) -> Vec<String> {
        vec!["rm".to_string(), "-f".to_string(), staged_path.to_string()]
    }
}

/// Render a command for logs with every occurrence of `secret` masked,
/// including the shell-quoted form used inside restore scripts
pub fn redact(command: &[String], secret: &str) -> String {
    let joined = command.join(" ");
    if secret.is_empty() {
        return joined;
    }

    let quoted = shell_quote(&DatabaseTools::password_arg(secret));
    joined
        .replace(&quoted, "'-p****'")
        .replace(secret, "****")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_test_command() {
        let tools = DatabaseTools::default();
        assert_eq!(
            tools.connection_test("secret"),
            vec!["mariadb", "-u", "root", "-psecret", "-e", "SELECT 1"]
        );
    }

    #[test]
    fn test_dump_command() {
        let tools = DatabaseTools::default();
        assert_eq!(
            tools.dump("secret", "app"),
            vec!["mariadb-dump", "-u", "root", "-psecret", "app"]
        );
    }

    #[test]
    fn test_gzip_upload_uses_decompress_pipe() {
        assert_eq!(RestoreMode::for_media_type("application/gzip"), RestoreMode::DecompressPipe);
        assert_eq!(RestoreMode::for_media_type("application/x-gzip"), RestoreMode::DecompressPipe);
        assert_eq!(
            RestoreMode::for_media_type("Application/GZIP; charset=binary"),
            RestoreMode::DecompressPipe
        );

        let tools = DatabaseTools::default();
        let cmd = tools.restore("secret", "app", "/tmp/upload_1", RestoreMode::DecompressPipe);
        assert_eq!(cmd[0], "bash");
        assert_eq!(cmd[1], "-c");
        assert_eq!(cmd[2], "gunzip -c '/tmp/upload_1' | mariadb -u 'root' '-psecret' 'app'");
    }

    #[test]
    fn test_plain_upload_reads_file_directly() {
        assert_eq!(RestoreMode::for_media_type("application/sql"), RestoreMode::DirectRead);
        assert_eq!(RestoreMode::for_media_type("application/octet-stream"), RestoreMode::DirectRead);
        assert_eq!(RestoreMode::for_media_type(""), RestoreMode::DirectRead);

        let tools = DatabaseTools::default();
        let cmd = tools.restore("secret", "app", "/tmp/upload_1", RestoreMode::DirectRead);
        assert_eq!(cmd[2], "mariadb -u 'root' '-psecret' 'app' < '/tmp/upload_1'");
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn test_redact_hides_secret() {
        let tools = DatabaseTools::default();
        let rendered = redact(&tools.dump("hunter2", "app"), "hunter2");
        assert_eq!(rendered, "mariadb-dump -u root -p**** app");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_redact_hides_quoted_secret_in_restore_script() {
        let tools = DatabaseTools::default();
        let secret = "pa'ss";
        let rendered = redact(
            &tools.restore(secret, "app", "/tmp/u", RestoreMode::DirectRead),
            secret,
        );
        assert_eq!(rendered, "bash -c mariadb -u 'root' '-p****' 'app' < '/tmp/u'");
        assert!(!rendered.contains("pa'"));
        assert!(!rendered.contains("ss'"));

        let piped = redact(
            &tools.restore(secret, "app", "/tmp/u", RestoreMode::DecompressPipe),
            secret,
        );
        assert!(piped.contains("'-p****'"));
        assert!(!piped.contains(r"pa'\''ss"));
    }
}

use std::borrow::Cow;
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// The environment files of a profile.
///
/// Files are read in the order `.env`, `.env.local`, `.env.<profile>`, `.env.<profile>.local`,
/// later files override earlier ones.
#[derive(Debug, Clone, Default)]
pub(crate) struct EnvFile {
    profile: Option<String>,
}

impl EnvFile {
    pub fn new(profile: Option<String>) -> Self {
        Self { profile }
    }

    fn names(&self) -> Vec<Cow<'static, str>> {
        let mut names = vec![Cow::from(".env"), ".env.local".into()];

        if let Some(ref m) = self.profile {
            names.push(format!(".env.{m}").into());
            names.push(format!(".env.{m}.local").into());
        }

        names
    }

    pub fn load<P>(&self, dir: P) -> HashMap<String, String>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref();
        let mut envs = HashMap::new();

        for env_name in self.names() {
            let path = dir.join(env_name.as_ref());
            if !path.exists() {
                continue;
            }

            if let Err(e) = dotenvy::from_path_iter(&path).and_then(|m| {
                for i in m {
                    let (k, v) = i?;
                    if env::var(&k).is_ok() {
                        // variables inherited from the process win.
                        continue;
                    }

                    envs.insert(k, v);
                }

                Ok(())
            }) {
                tracing::warn!(path = %path.display(), reason = ?e, "failed to load environment file");
            }
        }

        envs
    }
}

/// One request to make a payload live on an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTrigger {
    pub account_id: u64,
    pub app_id: u64,
    /// Directory of the application inside its repository.
    pub app_path: String,
    /// Environment name, which is also the branch the platform watches.
    pub environment: String,
    /// Identifier returned by the upload of the payload.
    pub payload_id: String,
}

/// Git URL of an application repository.
///
/// Slashes and whitespace are not valid in the repository name the
/// platform serves, so they are dropped from the application name.
pub fn repository_url(git_base: &str, account_id: u64, app_id: u64, app_name: &str) -> String {
    let repo_name: String = app_name
        .chars()
        .filter(|c| *c != '/' && !c.is_whitespace())
        .collect();
    format!(
        "{}/account/{}/application/{}/{}.git",
        git_base.trim_end_matches('/'),
        account_id,
        app_id,
        repo_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_platform_repository_url() {
        assert_eq!(
            repository_url("https://aperture.section.io", 42, 7, "My App"),
            "https://aperture.section.io/account/42/application/7/MyApp.git"
        );
    }

    #[test]
    fn strips_slashes_and_trailing_base_slash() {
        assert_eq!(
            repository_url("https://aperture.section.io/", 1, 2, "team/site\tv2"),
            "https://aperture.section.io/account/1/application/2/teamsitev2.git"
        );
    }
}

use ::url::Url;

use crate::error::ProjectApiError;

pub const GET_PROJECT_PATH: &[&str] = &["projects", "get-project"];
pub const UPDATE_FILE_TREE_PATH: &[&str] = &["projects", "update-file-tree"];
pub const ADD_USER_PATH: &[&str] = &["projects", "add-user"];
pub const ALL_USERS_PATH: &[&str] = &["users", "all"];

/// Appends `segments` to the path of `base_url`.
///
/// Segments are percent-encoded individually, so a project id can never
/// escape its path position. A trailing slash on the base is ignored.
pub fn endpoint<S: AsRef<str>>(base_url: &str, segments: &[S]) -> Result<Url, ProjectApiError> {
    let trimmed = base_url.trim();
    let mut url = Url::parse(trimmed)
        .map_err(|error| ProjectApiError::InvalidBaseUrl(format!("{trimmed}: {error}")))?;

    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| ProjectApiError::InvalidBaseUrl(format!("{trimmed}: cannot be a base")))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment.as_ref());
        }
    }

    Ok(url)
}

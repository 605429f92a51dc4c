//! Candidate feed wire format. Only the fields the deck displays are decoded;
//! everything else in the upstream payload is ignored.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{Candidate, CandidateId, DisplayPayload};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub results: Vec<FeedProfile>,
    #[serde(default)]
    pub info: Option<FeedInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub seed: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub page: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedProfile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: FeedName,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: FeedLocation,
    #[serde(default)]
    pub dob: Option<FeedDob>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cell: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub picture: FeedPicture,
    #[serde(default)]
    pub login: Option<FeedLogin>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedName {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub first: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedLocation {
    #[serde(default, deserialize_with = "null_as_default")]
    pub city: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedDob {
    #[serde(default)]
    pub age: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedPicture {
    #[serde(default, deserialize_with = "null_as_default")]
    pub large: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedLogin {
    #[serde(default, deserialize_with = "null_as_default")]
    pub uuid: String,
}

impl FeedProfile {
    /// Email is the identity; the login uuid stands in when the email is
    /// missing. A profile with neither keeps a blank identity.
    pub fn identity(&self) -> CandidateId {
        let email = self.email.as_deref().map(str::trim).unwrap_or_default();
        if !email.is_empty() {
            return CandidateId::new(email);
        }
        let uuid = self
            .login
            .as_ref()
            .map(|login| login.uuid.trim())
            .unwrap_or_default();
        CandidateId::new(uuid)
    }

    pub fn into_candidate(self) -> Candidate {
        let identity = self.identity();
        let name = [self.name.first.trim(), self.name.last.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Candidate {
            identity,
            payload: DisplayPayload {
                name,
                age: self.dob.and_then(|dob| dob.age),
                email: self.email.unwrap_or_default(),
                city: self.location.city,
                phone: self.cell,
                image_url: self.picture.large,
            },
        }
    }
}

/// Upstream profiles sometimes carry explicit nulls; treat them as absent
/// so one bad field does not fail the whole batch.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl FeedResponse {
    pub fn into_candidates(self) -> Vec<Candidate> {
        self.results
            .into_iter()
            .map(FeedProfile::into_candidate)
            .collect()
    }
}

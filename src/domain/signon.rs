//! Signon message aggregates.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::common::Status;
use crate::error::Result;
use crate::meta::{impl_aggregate, RegistryBuilder};

/// Financial institution identification (`FI`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct FinancialInstitutionInfo {
    pub organization: Option<String>,
    pub fi_id: Option<String>,
}

/// Signon request (`SONRQ`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SignonRequest {
    pub timestamp: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub password: Option<String>,
    pub user_key: Option<String>,
    pub generate_user_key: Option<bool>,
    pub language: Option<String>,
    pub financial_institution: Option<FinancialInstitutionInfo>,
    pub session_id: Option<String>,
    pub application_id: Option<String>,
    pub application_version: Option<String>,
}

/// Signon response (`SONRS`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SignonResponse {
    pub status: Option<Status>,
    pub timestamp: Option<DateTime<Utc>>,
    pub user_key: Option<String>,
    pub language: Option<String>,
    pub profile_last_updated: Option<DateTime<Utc>>,
    pub account_last_updated: Option<DateTime<Utc>>,
    pub financial_institution: Option<FinancialInstitutionInfo>,
    pub session_id: Option<String>,
    pub access_key: Option<String>,
}

impl_aggregate!(FinancialInstitutionInfo, SignonRequest, SignonResponse);

pub(crate) fn register(builder: &mut RegistryBuilder) -> Result<()> {
    builder
        .aggregate::<FinancialInstitutionInfo>("FI")?
        .string(
            "ORG",
            0,
            true,
            |f| f.organization.clone(),
            |f, v| f.organization = Some(v),
        )
        .string("FID", 10, false, |f| f.fi_id.clone(), |f, v| f.fi_id = Some(v));

    builder
        .aggregate::<SignonRequest>("SONRQ")?
        .datetime("DTCLIENT", 0, true, |r| r.timestamp, |r, v| r.timestamp = Some(v))
        .string(
            "USERID",
            10,
            false,
            |r| r.user_id.clone(),
            |r, v| r.user_id = Some(v),
        )
        .string(
            "USERPASS",
            20,
            false,
            |r| r.password.clone(),
            |r, v| r.password = Some(v),
        )
        .string(
            "USERKEY",
            30,
            false,
            |r| r.user_key.clone(),
            |r, v| r.user_key = Some(v),
        )
        .boolean(
            "GENUSERKEY",
            40,
            false,
            |r| r.generate_user_key,
            |r, v| r.generate_user_key = Some(v),
        )
        .string(
            "LANGUAGE",
            50,
            true,
            |r| r.language.clone(),
            |r, v| r.language = Some(v),
        )
        .child::<FinancialInstitutionInfo>(
            60,
            false,
            |r| r.financial_institution.as_ref(),
            |r, v| r.financial_institution = Some(v),
        )
        .string(
            "SESSCOOKIE",
            70,
            false,
            |r| r.session_id.clone(),
            |r, v| r.session_id = Some(v),
        )
        .string(
            "APPID",
            80,
            true,
            |r| r.application_id.clone(),
            |r, v| r.application_id = Some(v),
        )
        .string(
            "APPVER",
            90,
            true,
            |r| r.application_version.clone(),
            |r, v| r.application_version = Some(v),
        );

    builder
        .aggregate::<SignonResponse>("SONRS")?
        .child::<Status>(0, true, |r| r.status.as_ref(), |r, v| r.status = Some(v))
        .datetime("DTSERVER", 10, true, |r| r.timestamp, |r, v| r.timestamp = Some(v))
        .string(
            "USERKEY",
            20,
            false,
            |r| r.user_key.clone(),
            |r, v| r.user_key = Some(v),
        )
        .string(
            "LANGUAGE",
            40,
            true,
            |r| r.language.clone(),
            |r, v| r.language = Some(v),
        )
        .datetime(
            "DTPROFUP",
            50,
            false,
            |r| r.profile_last_updated,
            |r, v| r.profile_last_updated = Some(v),
        )
        .datetime(
            "DTACCTUP",
            60,
            false,
            |r| r.account_last_updated,
            |r, v| r.account_last_updated = Some(v),
        )
        .child::<FinancialInstitutionInfo>(
            70,
            false,
            |r| r.financial_institution.as_ref(),
            |r, v| r.financial_institution = Some(v),
        )
        .string(
            "SESSCOOKIE",
            80,
            false,
            |r| r.session_id.clone(),
            |r, v| r.session_id = Some(v),
        )
        .string(
            "ACCESSKEY",
            90,
            false,
            |r| r.access_key.clone(),
            |r, v| r.access_key = Some(v),
        );

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::domain::default_registry;
    use crate::error::Error;
    use crate::reader::AggregateUnmarshaller;
    use crate::writer::AggregateMarshaller;
    use crate::OfxVersion;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_signon_response_parses_nested_status() {
        let doc = "OFXHEADER:100\nVERSION:102\n\n\
                   <SONRS><STATUS><CODE>0<SEVERITY>INFO</STATUS>\
                   <DTSERVER>20230705142530<LANGUAGE>ENG\
                   <FI><ORG>Example Bank<FID>5959</FI></SONRS>";
        let response: SignonResponse = AggregateUnmarshaller::new(default_registry())
            .unmarshal(doc.as_bytes())
            .unwrap();
        assert!(response.status.as_ref().unwrap().is_success());
        assert_eq!(
            response.financial_institution.as_ref().unwrap().organization.as_deref(),
            Some("Example Bank")
        );
        assert_eq!(
            response.timestamp,
            Some(Utc.with_ymd_and_hms(2023, 7, 5, 14, 25, 30).unwrap())
        );
    }

    #[test]
    fn test_signon_response_requires_status() {
        let doc = "OFXHEADER:100\nVERSION:102\n\n\
                   <SONRS><DTSERVER>20230705142530<LANGUAGE>ENG</SONRS>";
        let result: Result<SignonResponse> =
            AggregateUnmarshaller::new(default_registry()).unmarshal(doc.as_bytes());
        assert!(matches!(result, Err(Error::MissingField { .. })));
    }

    #[test]
    fn test_signon_request_round_trip() {
        let request = SignonRequest {
            timestamp: Some(Utc.with_ymd_and_hms(2023, 7, 5, 14, 25, 30).unwrap()),
            user_id: Some("jdoe".to_string()),
            language: Some("ENG".to_string()),
            financial_institution: Some(FinancialInstitutionInfo {
                organization: Some("Example Bank".to_string()),
                fi_id: Some("5959".to_string()),
            }),
            application_id: Some("QWIN".to_string()),
            application_version: Some("2700".to_string()),
            ..SignonRequest::default()
        };
        let bytes = AggregateMarshaller::new(default_registry())
            .marshal(&request, OfxVersion::V2)
            .unwrap();
        let parsed: SignonRequest = AggregateUnmarshaller::new(default_registry())
            .unmarshal(&bytes)
            .unwrap();
        assert_eq!(parsed, request);
    }
}

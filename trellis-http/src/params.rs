use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use trellis::{Dependencies, InjectionToken, Method, Provider};

use crate::{HTTP_REQUEST, HTTP_REQUEST_BODY, HttpError};

/// Request parameters for [`Method`]s invoked by routes.
///
/// Each parameter gets a token of its own and a provider visible only
/// while that parameter is resolved. Missing or malformed values fail the
/// invocation with an [`HttpError`] before the method body runs.
pub trait RequestParamExt: Sized {
    /// Adds a parameter parsed from the `:name` path segment.
    fn path_param<V>(self, name: &'static str) -> Self
    where
        V: FromStr + Clone + Send + Sync + 'static,
        V::Err: fmt::Display;

    /// Adds a required parameter parsed from the first `name` query value.
    fn query_param<V>(self, name: &'static str) -> Self
    where
        V: FromStr + Clone + Send + Sync + 'static,
        V::Err: fmt::Display;

    /// Adds an `Option<V>` parameter parsed from the first `name` query value.
    fn optional_query_param<V>(self, name: &'static str) -> Self
    where
        V: FromStr + Clone + Send + Sync + 'static,
        V::Err: fmt::Display;

    /// Adds a parameter deserialized from the parsed request body.
    fn body_param<V>(self, name: &'static str) -> Self
    where
        V: DeserializeOwned + Clone + Send + Sync + 'static;
}

impl<T, R> RequestParamExt for Method<T, R>
where
    T: ?Sized + Send + Sync + 'static,
    R: Send + 'static,
{
    fn path_param<V>(self, name: &'static str) -> Self
    where
        V: FromStr + Clone + Send + Sync + 'static,
        V::Err: fmt::Display,
    {
        let token = InjectionToken::<V>::new(format!("PathParam({name})"));
        let provider = Provider::factory(&token, move |deps| {
            let request = deps.get(&HTTP_REQUEST)?;
            let raw = request
                .params
                .get(name)
                .ok_or_else(|| HttpError::missing_param(name))?;
            Ok(parse_param(name, raw)?)
        })
        .deps(Dependencies::new().token(&HTTP_REQUEST));
        self.param_with_providers(name, &token, vec![provider.into_any()])
    }

    fn query_param<V>(self, name: &'static str) -> Self
    where
        V: FromStr + Clone + Send + Sync + 'static,
        V::Err: fmt::Display,
    {
        let token = InjectionToken::<V>::new(format!("QueryParam({name})"));
        let provider = Provider::factory(&token, move |deps| {
            let request = deps.get(&HTTP_REQUEST)?;
            let raw = request
                .query_value(name)
                .ok_or_else(|| HttpError::missing_param(name))?;
            Ok(parse_param(name, raw)?)
        })
        .deps(Dependencies::new().token(&HTTP_REQUEST));
        self.param_with_providers(name, &token, vec![provider.into_any()])
    }

    fn optional_query_param<V>(self, name: &'static str) -> Self
    where
        V: FromStr + Clone + Send + Sync + 'static,
        V::Err: fmt::Display,
    {
        let token = InjectionToken::<Option<V>>::new(format!("QueryParam({name})"));
        let provider = Provider::factory(&token, move |deps| {
            let request = deps.get(&HTTP_REQUEST)?;
            match request.query_value(name) {
                Some(raw) => Ok(Some(parse_param(name, raw)?)),
                None => Ok(None),
            }
        })
        .deps(Dependencies::new().token(&HTTP_REQUEST));
        self.param_with_providers(name, &token, vec![provider.into_any()])
    }

    fn body_param<V>(self, name: &'static str) -> Self
    where
        V: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let token = InjectionToken::<V>::new(format!("BodyParam({name})"));
        let provider = Provider::factory(&token, move |deps| {
            let body = deps.get(&HTTP_REQUEST_BODY)?;
            if body.is_null() {
                return Err(HttpError::missing_param(name).into());
            }
            serde_json::from_value(body.as_ref().clone())
                .map_err(|err| HttpError::invalid_param(name, err).into())
        })
        .deps(Dependencies::new().token(&HTTP_REQUEST_BODY));
        self.param_with_providers(name, &token, vec![provider.into_any()])
    }
}

fn parse_param<V>(name: &str, raw: &str) -> Result<V, HttpError>
where
    V: FromStr,
    V::Err: fmt::Display,
{
    raw.parse().map_err(|err| HttpError::invalid_param(name, err))
}

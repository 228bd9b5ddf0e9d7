use anyhow::{anyhow, Result};
use stratus_core::{
    auth::{RequestSigner, SignedRequest},
    config::{Configuration, CredentialResolver},
};

/// Print the headers a request would carry, one `name: value` per line
pub fn sign(
    resolver: CredentialResolver,
    method: &str,
    path: &str,
    body: Option<&str>,
    user: Option<&str>,
) -> Result<()> {
    let signed = signed_request(&resolver.resolve()?, method, path, body, user)?;

    println!("{} {}", signed.method, signed.path);
    for (name, value) in signed.headers.iter() {
        println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }

    Ok(())
}

/// Sign the way a session would: a GET never carries a body
fn signed_request(
    configuration: &Configuration,
    method: &str,
    path: &str,
    body: Option<&str>,
    user: Option<&str>,
) -> Result<SignedRequest> {
    if configuration.app_identity().is_none() {
        return Err(anyhow!("Signing requires application credentials"));
    }

    let body = if method.eq_ignore_ascii_case("GET") {
        if body.is_some() {
            warn!("Ignoring the body of a GET request");
        }
        None
    } else {
        body
    };

    let signer = RequestSigner::try_new(configuration.credentials())?.with_user(user)?;
    Ok(signer.sign(method, path, body.map(str::as_bytes)))
}

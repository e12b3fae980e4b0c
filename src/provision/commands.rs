//! Shell rendering for install directives.
//!
//! Every command rendered here is safe to re-run on an already provisioned
//! host: repository lines are appended only when absent, package installs go
//! through `apt-get install -y`, remote packages are probed by version first,
//! and services are stopped before being started.

use shell_escape::unix::escape;

use super::{AptKey, AptRepository, RemotePackage};

const APT_ENV: &str = "DEBIAN_FRONTEND=noninteractive";
const SOURCES_DIR: &str = "/etc/apt/sources.list.d";

/// Renders the command that imports `key` into the APT keyring.
#[must_use]
pub fn import_key_command(key: &AptKey) -> String {
    match key {
        AptKey::Keyserver { server, id } => format!(
            "apt-key adv --keyserver {} --recv {}",
            escape(server.as_str().into()),
            escape(id.as_str().into())
        ),
        AptKey::Url(url) => format!(
            "wget -q -O - {} | apt-key add -",
            escape(url.as_str().into())
        ),
    }
}

/// Renders the command that adds `repository` to its list file and refreshes
/// the package index.
///
/// The suite is interpolated inside double quotes so values such as
/// `$(lsb_release -sc)` expand on the remote host.
#[must_use]
pub fn enable_repository_command(repository: &AptRepository) -> String {
    let list_file = format!("{SOURCES_DIR}/{}.list", repository.list_name);
    let escaped_file = escape(list_file.into());
    format!(
        concat!(
            "line=\"{kind} {url} {suite} {components}\"; ",
            "touch {file} && ",
            "{{ grep -qxF \"$line\" {file} || echo \"$line\" >> {file}; }} && ",
            "{env} apt-get update -qq"
        ),
        kind = repository.kind,
        url = repository.url,
        suite = repository.suite,
        components = repository.components.join(" "),
        file = escaped_file,
        env = APT_ENV,
    )
}

/// Renders a full system upgrade that keeps existing configuration files.
#[must_use]
pub fn upgrade_system_command() -> String {
    format!(
        concat!(
            "{env} apt-get update -qq && ",
            "{env} apt-get -y -q ",
            "-o Dpkg::Options::=--force-confdef -o Dpkg::Options::=--force-confold ",
            "dist-upgrade"
        ),
        env = APT_ENV
    )
}

/// Renders an `apt-get install` for `packages`.
#[must_use]
pub fn install_packages_command(packages: &[String]) -> String {
    let mut command = format!("{APT_ENV} apt-get install -y -q");
    for package in packages {
        command.push(' ');
        command.push_str(escape(package.as_str().into()).as_ref());
    }
    command
}

/// Renders the download-and-install of a `.deb`, skipped when the requested
/// version is already installed.
#[must_use]
pub fn install_remote_package_command(package: &RemotePackage) -> String {
    let name = escape(package.name.as_str().into());
    let version = escape(package.version.as_str().into());
    let download = escape(
        format!("/tmp/{}_{}.deb", package.name, package.version).into(),
    );
    format!(
        concat!(
            "dpkg-query -W -f='${{Version}}' {name} 2>/dev/null | grep -qF {version} || ",
            "{{ wget -q -O {download} {url} && dpkg -i {download}; }}"
        ),
        name = name,
        version = version,
        download = download,
        url = escape(package.url.as_str().into()),
    )
}

/// Renders a restart that succeeds whether or not the service was running.
#[must_use]
pub fn restart_service_command(service: &str) -> String {
    let name = escape(service.into());
    format!("service {name} stop >/dev/null 2>&1 || true; service {name} start")
}

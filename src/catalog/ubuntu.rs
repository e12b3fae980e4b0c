//! Ubuntu 14.04 single-node Mesos profile.

use crate::checks::Protocol;
use crate::pipeline::{Assertion, Check};
use crate::provision::{AptKey, AptRepository, ProvisionStep, RemotePackage, StepAction};

const CODENAME: &str = "$(lsb_release -sc)";
const VAGRANT_VERSION: &str = "1.7.4";
const VAGRANT_PLUGIN: &str = "vagrant-reload";
const VIRTUALBOX_PACKAGE: &str = "virtualbox-5.0";

const REQUIRED_PACKAGES: &[&str] = &[
    "apt-transport-https",
    "software-properties-common",
    "build-essential",
    "python-virtualenv",
    "desktop-file-utils",
    "git",
    "python-dev",
    "python-tox",
    "libffi-dev",
    "libssl-dev",
    "wget",
    "curl",
    "openjdk-7-jre-headless",
    "lintian",
    "ntp",
    "rpm2cpio",
    "createrepo",
    "libexpat1-dev",
    "libcurl4-openssl-dev",
    "zlib1g-dev",
    "libwww-curl-perl",
    "nginx",
    "libsvn-perl",
    "ruby-dev",
];

const MESOS_PACKAGES: &[&str] = &["zookeeperd", "mesos", "marathon"];
const MESOS_SERVICES: &[&str] = &["zookeeper", "mesos-master", "mesos-slave", "marathon"];

/// Scheduler components checked after the nginx block, with their packages
/// and ports.
const SERVICES: &[(&str, &str, u16)] = &[
    ("zookeeper", "zookeeper", 2181),
    ("mesos-master", "mesos", 5050),
    ("mesos-slave", "mesos", 5051),
    ("marathon", "marathon", 8080),
];

pub(super) fn required_packages() -> Vec<String> {
    owned(REQUIRED_PACKAGES)
}

pub(super) fn bootstrap_steps() -> Vec<ProvisionStep> {
    let mut steps = vec![
        ProvisionStep::new(
            "enable ubuntu archive repositories",
            StepAction::EnableRepository(AptRepository {
                kind: String::from("deb"),
                url: String::from("http://archive.ubuntu.com/ubuntu"),
                suite: CODENAME.to_owned(),
                components: owned(&["main", "universe", "restricted", "multiverse"]),
                list_name: String::from("ubuntu-archive"),
                key: None,
            }),
        ),
        ProvisionStep::new("install OS updates", StepAction::UpgradeSystem),
        ProvisionStep::new(
            "install required packages",
            StepAction::InstallPackages(required_packages()),
        ),
        ProvisionStep::new(
            "enable mesosphere repository",
            StepAction::EnableRepository(AptRepository {
                kind: String::from("deb"),
                url: String::from("http://repos.mesosphere.com/ubuntu"),
                suite: CODENAME.to_owned(),
                components: owned(&["main"]),
                list_name: String::from("mesosphere"),
                key: Some(AptKey::Keyserver {
                    server: String::from("hkp://keyserver.ubuntu.com:80"),
                    id: String::from("E56151BF"),
                }),
            }),
        ),
        ProvisionStep::new(
            "install mesos on a single node",
            StepAction::InstallPackages(owned(MESOS_PACKAGES)),
        ),
    ];

    steps.extend(MESOS_SERVICES.iter().map(|service| {
        ProvisionStep::new(
            format!("restart {service}"),
            StepAction::RestartService((*service).to_owned()),
        )
    }));

    steps.extend([
        ProvisionStep::new(
            "update pip",
            StepAction::Shell {
                command: String::from("pip install --upgrade 'pip>=7,<8'"),
                privileged: true,
            },
        ),
        ProvisionStep::new(
            "enable virtualbox repository",
            StepAction::EnableRepository(AptRepository {
                kind: String::from("deb"),
                url: String::from("http://download.virtualbox.org/virtualbox/debian"),
                suite: CODENAME.to_owned(),
                components: owned(&["contrib"]),
                list_name: String::from("virtualbox"),
                key: Some(AptKey::Url(String::from(
                    "https://www.virtualbox.org/download/oracle_vbox.asc",
                ))),
            }),
        ),
        ProvisionStep::new(
            "install virtualbox 5",
            StepAction::InstallPackages(owned(&["dkms", VIRTUALBOX_PACKAGE])),
        ),
        ProvisionStep::new(
            format!("install vagrant {VAGRANT_VERSION}"),
            StepAction::InstallRemotePackage(RemotePackage {
                name: String::from("vagrant"),
                version: VAGRANT_VERSION.to_owned(),
                url: format!(
                    "https://releases.hashicorp.com/vagrant/{VAGRANT_VERSION}/vagrant_{VAGRANT_VERSION}_x86_64.deb"
                ),
            }),
        ),
        ProvisionStep::new(
            format!("install vagrant plugin {VAGRANT_PLUGIN}"),
            StepAction::Shell {
                command: format!(
                    "vagrant plugin list | grep -q {VAGRANT_PLUGIN} || vagrant plugin install {VAGRANT_PLUGIN}"
                ),
                privileged: true,
            },
        ),
    ]);
    steps
}

pub(super) fn acceptance_checks() -> Vec<Assertion> {
    let mut checks: Vec<Assertion> = REQUIRED_PACKAGES
        .iter()
        .map(|package| {
            Assertion::new(
                format!("package {package} is installed"),
                Check::PackageInstalled((*package).to_owned()),
            )
        })
        .collect();

    // nginx serves the freshly built packages to downstream jobs.
    checks.extend([
        Assertion::new(
            "nginx package is installed",
            Check::PackageInstalled(String::from("nginx")),
        ),
        Assertion::new(
            "nginx listens on 80/tcp",
            Check::PortListening {
                port: 80,
                protocol: Protocol::Tcp,
            },
        ),
        Assertion::new(
            "nginx process is running",
            Check::ProcessRunning(String::from("nginx")),
        ),
        Assertion::new(
            "nginx init script is present",
            listing_contains("ls -l /etc/init.d/", "nginx"),
        ),
    ]);

    for (service, package, port) in SERVICES {
        checks.extend([
            Assertion::new(
                format!("{service} package {package} is installed"),
                Check::PackageInstalled((*package).to_owned()),
            ),
            Assertion::new(
                format!("{service} listens on {port}/tcp"),
                Check::PortListening {
                    port: *port,
                    protocol: Protocol::Tcp,
                },
            ),
            Assertion::new(
                format!("{service} upstart job is present"),
                listing_contains("ls -l /etc/init/", service),
            ),
        ]);
    }

    checks.extend([
        Assertion::new(
            "virtualbox package is installed",
            Check::PackageInstalled(VIRTUALBOX_PACKAGE.to_owned()),
        ),
        Assertion::new(
            "vboxdrv kernel module is loaded",
            Check::OutputContains {
                command: String::from("lsmod"),
                substring: String::from("vboxdrv"),
                privileged: true,
            },
        ),
        Assertion::new(
            "vagrant package is installed",
            Check::PackageInstalled(String::from("vagrant")),
        ),
        Assertion::new(
            format!("vagrant plugin {VAGRANT_PLUGIN} is installed"),
            Check::OutputContains {
                command: String::from("vagrant plugin list"),
                substring: VAGRANT_PLUGIN.to_owned(),
                privileged: true,
            },
        ),
        Assertion::new(
            "pip is version 7",
            listing_contains("pip --version", "pip 7."),
        ),
    ]);
    checks
}

fn listing_contains(command: &str, substring: &str) -> Check {
    Check::OutputContains {
        command: command.to_owned(),
        substring: substring.to_owned(),
        privileged: false,
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}
